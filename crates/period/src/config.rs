use serde::Deserialize;
use serde_json::Value;

use crate::error::StrataError;
use crate::model::PeriodKey;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Immutable configuration for one invocation. Built once at the entry point
/// and passed explicitly to the classifier, runner, reconciler and pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrataConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Period treated as authoritative during reconciliation. Callers may
    /// supply it per run instead.
    #[serde(default)]
    pub current_period: Option<PeriodKey>,
    #[serde(default)]
    pub fields: FieldBindings,
    #[serde(default)]
    pub marker: MarkerVocabulary,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

fn default_name() -> String {
    "strata".into()
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            current_period: None,
            fields: FieldBindings::default(),
            marker: MarkerVocabulary::default(),
            runner: RunnerConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Field bindings
// ---------------------------------------------------------------------------

/// Names of the record fields the core reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldBindings {
    pub reference: String,
    pub stratum: String,
    pub value: String,
    pub region: String,
    pub marker: String,
    pub period: String,
}

impl Default for FieldBindings {
    fn default() -> Self {
        Self {
            reference: "responder_id".into(),
            stratum: "strata".into(),
            value: "Q608_total".into(),
            region: "region".into(),
            marker: "land_or_marine".into(),
            period: "period".into(),
        }
    }
}

impl FieldBindings {
    /// Fields every record must carry before classification. `value` is
    /// nullable and may be absent; `stratum` is written, not read.
    pub fn required_for_classify(&self) -> [&str; 4] {
        [
            self.reference.as_str(),
            self.period.as_str(),
            self.marker.as_str(),
            self.region.as_str(),
        ]
    }

    pub fn reconcile_fields(&self) -> ReconcileFields {
        ReconcileFields {
            reference: self.reference.clone(),
            stratum: self.stratum.clone(),
            period: self.period.clone(),
        }
    }

    fn named(&self) -> [(&'static str, &str); 6] {
        [
            ("reference", self.reference.as_str()),
            ("stratum", self.stratum.as_str()),
            ("value", self.value.as_str()),
            ("region", self.region.as_str()),
            ("marker", self.marker.as_str()),
            ("period", self.period.as_str()),
        ]
    }
}

/// The three bindings the reconciler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileFields {
    pub reference: String,
    pub stratum: String,
    pub period: String,
}

impl ReconcileFields {
    pub fn new(reference: &str, stratum: &str, period: &str) -> Self {
        Self {
            reference: reference.into(),
            stratum: stratum.into(),
            period: period.into(),
        }
    }

    pub fn validate(&self) -> Result<(), StrataError> {
        for (binding, name) in [
            ("reference", &self.reference),
            ("stratum", &self.stratum),
            ("period", &self.period),
        ] {
            if name.trim().is_empty() {
                return Err(ReconcileFields::empty(binding));
            }
        }
        if self.reference == self.stratum
            || self.reference == self.period
            || self.stratum == self.period
        {
            return Err(StrataError::ConfigValidation(
                "reference, stratum and period must name different fields".into(),
            ));
        }
        Ok(())
    }

    fn empty(binding: &str) -> StrataError {
        StrataError::ConfigValidation(format!("field binding '{binding}' must not be empty"))
    }
}

// ---------------------------------------------------------------------------
// Marker vocabulary
// ---------------------------------------------------------------------------

/// Which side of the survey population a marker value denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Population {
    Land,
    Marine,
}

/// How the marker field is read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "vocabulary", rename_all = "snake_case")]
pub enum MarkerVocabulary {
    /// Two-value land/marine indicator.
    LandMarine {
        #[serde(default = "default_land_letter")]
        land: String,
        #[serde(default = "default_marine_letter")]
        marine: String,
    },
    /// Three-digit survey code; one code is the marine-equivalent population.
    SurveyCode {
        #[serde(default = "default_marine_code")]
        marine_code: String,
        #[serde(default = "default_land_codes")]
        land_codes: Vec<String>,
    },
}

fn default_land_letter() -> String {
    "L".into()
}

fn default_marine_letter() -> String {
    "M".into()
}

fn default_marine_code() -> String {
    "076".into()
}

fn default_land_codes() -> Vec<String> {
    vec!["066".into()]
}

impl Default for MarkerVocabulary {
    fn default() -> Self {
        Self::LandMarine {
            land: default_land_letter(),
            marine: default_marine_letter(),
        }
    }
}

impl MarkerVocabulary {
    pub fn survey_code() -> Self {
        Self::SurveyCode {
            marine_code: default_marine_code(),
            land_codes: default_land_codes(),
        }
    }

    /// Map a raw marker value onto a population. `None` means the marker is
    /// outside the vocabulary.
    pub fn population(&self, marker: &Value) -> Option<Population> {
        match self {
            Self::LandMarine { land, marine } => {
                let s = marker.as_str()?.trim();
                if s == marine.as_str() {
                    Some(Population::Marine)
                } else if s == land.as_str() {
                    Some(Population::Land)
                } else {
                    None
                }
            }
            Self::SurveyCode { marine_code, land_codes } => {
                let code = survey_code_of(marker)?;
                if &code == marine_code {
                    Some(Population::Marine)
                } else if land_codes.iter().any(|c| c == &code) {
                    Some(Population::Land)
                } else {
                    None
                }
            }
        }
    }

    fn validate(&self) -> Result<(), StrataError> {
        match self {
            Self::LandMarine { land, marine } => {
                if land.is_empty() || marine.is_empty() {
                    return Err(StrataError::ConfigValidation(
                        "land/marine markers must not be empty".into(),
                    ));
                }
                if land == marine {
                    return Err(StrataError::ConfigValidation(format!(
                        "land and marine markers must differ, both are '{land}'"
                    )));
                }
            }
            Self::SurveyCode { marine_code, land_codes } => {
                for code in std::iter::once(marine_code).chain(land_codes) {
                    if !is_survey_code(code) {
                        return Err(StrataError::ConfigValidation(format!(
                            "survey code '{code}' must be exactly three digits"
                        )));
                    }
                }
                if land_codes.is_empty() {
                    return Err(StrataError::ConfigValidation(
                        "at least one land survey code is required".into(),
                    ));
                }
                if land_codes.contains(marine_code) {
                    return Err(StrataError::ConfigValidation(format!(
                        "survey code '{marine_code}' cannot be both marine and land"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn is_survey_code(code: &str) -> bool {
    code.len() == 3 && code.bytes().all(|b| b.is_ascii_digit())
}

/// Survey codes arrive as `"076"`, as `"76"`, or as the integer `76`.
fn survey_code_of(marker: &Value) -> Option<String> {
    match marker {
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.len() < 3 && s.bytes().all(|b| b.is_ascii_digit()) {
                Some(format!("{s:0>3}"))
            } else {
                Some(s.to_string())
            }
        }
        Value::Number(n) => n.as_u64().filter(|c| *c < 1000).map(|c| format!("{c:03}")),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Runner + Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerConfig {
    /// Worker threads for per-record classification. 1 = run inline.
    pub threads: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self { threads: 1 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Module name reported in response envelopes and notifications.
    pub module: String,
    pub checkpoint: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            module: "Strata".into(),
            checkpoint: "strata".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl StrataConfig {
    pub fn from_toml(input: &str) -> Result<Self, StrataError> {
        let config: StrataConfig =
            toml::from_str(input).map_err(|e| StrataError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), StrataError> {
        let named = self.fields.named();
        for (binding, name) in &named {
            if name.trim().is_empty() {
                return Err(ReconcileFields::empty(binding));
            }
        }

        // Each binding must point at its own field
        for (i, (binding, name)) in named.iter().enumerate() {
            if let Some((other, _)) = named[i + 1..].iter().find(|(_, n)| n == name) {
                return Err(StrataError::ConfigValidation(format!(
                    "bindings '{binding}' and '{other}' both name field '{name}'"
                )));
            }
        }

        self.marker.validate()?;

        if self.runner.threads == 0 {
            return Err(StrataError::ConfigValidation(
                "runner.threads must be at least 1".into(),
            ));
        }

        if self.pipeline.module.trim().is_empty() {
            return Err(StrataError::ConfigValidation(
                "pipeline.module must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Current period for this run: the explicit override if given,
    /// otherwise the configured one.
    pub fn resolve_period(&self, override_period: Option<PeriodKey>) -> Result<PeriodKey, StrataError> {
        override_period
            .or_else(|| self.current_period.clone())
            .ok_or_else(|| {
                StrataError::ConfigValidation(
                    "no current period: set current_period or pass one explicitly".into(),
                )
            })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
