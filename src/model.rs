//! Single-variable linear regression mapping CGPA to a placement package.
//!
//! The model is an affine function `package = slope * cgpa + intercept`.
//! It can be built from the published coefficients, fitted by ordinary least
//! squares on the built-in placement sample, or loaded from a JSON model file.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PredictorError, Result};

/// Slope of the published placement model.
pub const DEFAULT_SLOPE: f64 = 0.55795197;

/// Intercept of the published placement model.
pub const DEFAULT_INTERCEPT: f64 = -0.8961119222429126;

/// Lowest accepted CGPA.
pub const CGPA_MIN: f64 = 0.0;

/// Highest accepted CGPA.
pub const CGPA_MAX: f64 = 10.0;

/// Built-in (CGPA, package in LPA) sample used when fitting.
pub const TRAINING_DATA: [(f64, f64); 10] = [
    (6.89, 3.26),
    (5.12, 1.98),
    (7.82, 3.25),
    (7.42, 3.67),
    (6.94, 3.57),
    (7.89, 2.99),
    (6.73, 2.60),
    (6.75, 2.48),
    (6.09, 2.31),
    (8.31, 3.51),
];

/// Where the predictor takes its coefficients from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    /// Use [`DEFAULT_SLOPE`] and [`DEFAULT_INTERCEPT`].
    #[default]
    Hardcoded,
    /// Fit on [`TRAINING_DATA`] at startup.
    Fitted,
    /// Load the model file, fitting and saving it when absent.
    File,
}

/// A fitted (or hardcoded) linear model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub slope: f64,
    pub intercept: f64,
    /// Number of samples the model was fitted on, zero when hardcoded.
    #[serde(default)]
    pub samples: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fitted_at: Option<DateTime<Utc>>,
}

impl Default for LinearModel {
    fn default() -> Self {
        Self::hardcoded()
    }
}

impl LinearModel {
    /// Creates a model from explicit coefficients.
    #[must_use]
    pub fn new(slope: f64, intercept: f64) -> Self {
        Self {
            slope,
            intercept,
            samples: 0,
            fitted_at: None,
        }
    }

    /// The published coefficients.
    #[must_use]
    pub fn hardcoded() -> Self {
        Self::new(DEFAULT_SLOPE, DEFAULT_INTERCEPT)
    }

    /// Fits ordinary least squares on `(x, y)` points.
    ///
    /// `slope = cov(X, Y) / var(X)` and `intercept = mean(Y) - slope * mean(X)`.
    ///
    /// # Errors
    ///
    /// Fails with fewer than two points, with non-finite values, or when every
    /// X is identical (zero variance).
    pub fn fit(points: &[(f64, f64)]) -> Result<Self> {
        if points.len() < 2 {
            return Err(PredictorError::model(format!(
                "need at least 2 samples to fit, got {}",
                points.len()
            )));
        }
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(PredictorError::model("training data contains non-finite values"));
        }

        let n = points.len() as f64;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

        let (cov, var) = points.iter().fold((0.0, 0.0), |(cov, var), (x, y)| {
            let dx = x - mean_x;
            (cov + dx * (y - mean_y), var + dx * dx)
        });

        if var == 0.0 {
            return Err(PredictorError::model(
                "all CGPA values are identical, slope is undefined",
            ));
        }

        let slope = cov / var;
        let intercept = mean_y - slope * mean_x;
        debug!(slope, intercept, samples = points.len(), "fitted linear model");

        Ok(Self {
            slope,
            intercept,
            samples: points.len(),
            fitted_at: Some(Utc::now()),
        })
    }

    /// Fits on the built-in placement sample.
    ///
    /// # Errors
    ///
    /// Never fails for the shipped data; the `Result` mirrors [`LinearModel::fit`].
    pub fn fit_builtin() -> Result<Self> {
        Self::fit(&TRAINING_DATA)
    }

    /// Raw prediction `slope * cgpa + intercept`.
    #[must_use]
    pub fn predict(&self, cgpa: f64) -> f64 {
        self.slope * cgpa + self.intercept
    }

    /// Prediction rounded to two decimals, as displayed.
    #[must_use]
    pub fn predict_rounded(&self, cgpa: f64) -> f64 {
        round2(self.predict(cgpa))
    }

    /// Loads a model from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file can't be read or a JSON error if it
    /// doesn't hold a model.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let model: LinearModel = serde_json::from_str(&content)?;
        if !model.slope.is_finite() || !model.intercept.is_finite() {
            return Err(PredictorError::model(format!(
                "model file {} holds non-finite coefficients",
                path.display()
            )));
        }
        Ok(model)
    }

    /// Saves the model as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Loads the model file if present, otherwise fits on the built-in data and
    /// saves the result. A corrupt file is replaced.
    ///
    /// # Errors
    ///
    /// Returns an error only if the freshly fitted model can't be saved.
    pub fn load_or_fit(path: &Path) -> Result<Self> {
        if path.exists() {
            match Self::load(path) {
                Ok(model) => {
                    info!(path = %path.display(), "loaded model file");
                    return Ok(model);
                }
                Err(e) => {
                    warn!(
                        "Corrupted model file at {}: {}. Refitting.",
                        path.display(),
                        e
                    );
                }
            }
        }

        let model = Self::fit_builtin()?;
        model.save(path)?;
        info!(path = %path.display(), "fitted model and saved it");
        Ok(model)
    }

    /// Builds the model for a configured source.
    ///
    /// # Errors
    ///
    /// Propagates fit or model file errors.
    pub fn from_source(source: ModelSource, model_file: &Path) -> Result<Self> {
        match source {
            ModelSource::Hardcoded => Ok(Self::hardcoded()),
            ModelSource::Fitted => Self::fit_builtin(),
            ModelSource::File => Self::load_or_fit(model_file),
        }
    }
}

/// Rounds half away from zero to two decimals.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Parses and range-checks a CGPA from form input.
///
/// # Errors
///
/// [`PredictorError::InvalidCgpa`] for anything that isn't a finite number,
/// [`PredictorError::CgpaOutOfRange`] outside `[0, 10]`.
pub fn parse_cgpa(input: &str) -> Result<f64> {
    let trimmed = input.trim();
    let value: f64 = trimmed
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| PredictorError::InvalidCgpa {
            input: trimmed.to_string(),
        })?;
    validate_cgpa(value)
}

/// Range-checks an already parsed CGPA.
///
/// # Errors
///
/// [`PredictorError::CgpaOutOfRange`] outside `[0, 10]`.
pub fn validate_cgpa(value: f64) -> Result<f64> {
    if (CGPA_MIN..=CGPA_MAX).contains(&value) {
        Ok(value)
    } else {
        Err(PredictorError::CgpaOutOfRange { value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hardcoded_prediction_rounds_to_two_decimals() {
        let model = LinearModel::hardcoded();
        // 0.55795197 * 8.5 - 0.8961119222 = 3.84648
        assert_eq!(model.predict_rounded(8.5), 3.85);
        assert_eq!(model.predict_rounded(8.0), 3.57);
        assert_eq!(model.predict_rounded(10.0), 4.68);
    }

    #[test]
    fn test_predict_is_affine() {
        let model = LinearModel::new(2.0, 3.0);
        assert_eq!(model.predict(0.0), 3.0);
        assert_eq!(model.predict(4.5), 12.0);
    }

    #[test]
    fn test_fit_recovers_exact_line() {
        let points: Vec<(f64, f64)> = (0..=10).map(|i| (i as f64, 0.5 * i as f64 - 1.0)).collect();
        let model = LinearModel::fit(&points).unwrap();
        assert!((model.slope - 0.5).abs() < 1e-12);
        assert!((model.intercept + 1.0).abs() < 1e-12);
        assert_eq!(model.samples, 11);
        assert!(model.fitted_at.is_some());
    }

    #[test]
    fn test_fit_builtin_gives_positive_packages() {
        let model = LinearModel::fit_builtin().unwrap();
        assert!(model.slope > 0.0);
        assert!(model.predict(8.5) > 0.0);
        assert_eq!(model.samples, TRAINING_DATA.len());
    }

    #[test]
    fn test_fit_rejects_too_few_points() {
        let err = LinearModel::fit(&[(7.0, 3.0)]).unwrap_err();
        assert!(matches!(err, PredictorError::Model { .. }));
    }

    #[test]
    fn test_fit_rejects_zero_variance() {
        let err = LinearModel::fit(&[(7.0, 3.0), (7.0, 4.0), (7.0, 5.0)]).unwrap_err();
        assert!(err.to_string().contains("identical"));
    }

    #[test]
    fn test_fit_rejects_non_finite() {
        assert!(LinearModel::fit(&[(f64::NAN, 3.0), (7.0, 4.0)]).is_err());
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(3.846479), 3.85);
        assert_eq!(round2(3.844), 3.84);
        assert_eq!(round2(-0.896), -0.9);
    }

    #[test]
    fn test_parse_cgpa_accepts_range_bounds() {
        assert_eq!(parse_cgpa("0").unwrap(), 0.0);
        assert_eq!(parse_cgpa("10").unwrap(), 10.0);
        assert_eq!(parse_cgpa(" 8.5 ").unwrap(), 8.5);
    }

    #[test]
    fn test_parse_cgpa_rejects_out_of_range() {
        for input in ["15", "-1", "10.01"] {
            let err = parse_cgpa(input).unwrap_err();
            assert!(
                err.to_string().contains("must be between 0 and 10"),
                "input {input}"
            );
        }
    }

    #[test]
    fn test_parse_cgpa_rejects_non_numeric() {
        for input in ["abc", "", "NaN", "inf", "8,5"] {
            let err = parse_cgpa(input).unwrap_err();
            assert!(matches!(err, PredictorError::InvalidCgpa { .. }), "input {input}");
        }
    }

    #[test]
    fn test_load_or_fit_creates_then_reuses_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("models/model.json");

        let first = LinearModel::load_or_fit(&path).unwrap();
        assert!(path.exists());

        let second = LinearModel::load_or_fit(&path).unwrap();
        assert!((first.slope - second.slope).abs() < 1e-12);
        assert!((first.intercept - second.intercept).abs() < 1e-12);
        assert_eq!(first.fitted_at, second.fitted_at);
    }

    #[test]
    fn test_load_or_fit_replaces_corrupt_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model.json");
        fs::write(&path, "not json").unwrap();

        let model = LinearModel::load_or_fit(&path).unwrap();
        assert_eq!(model.samples, TRAINING_DATA.len());
        assert!(LinearModel::load(&path).is_ok());
    }

    #[test]
    fn test_from_source() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model.json");

        let hardcoded = LinearModel::from_source(ModelSource::Hardcoded, &path).unwrap();
        assert_eq!(hardcoded.slope, DEFAULT_SLOPE);
        assert!(!path.exists());

        let fitted = LinearModel::from_source(ModelSource::Fitted, &path).unwrap();
        assert_eq!(fitted.samples, 10);
        assert!(!path.exists());

        LinearModel::from_source(ModelSource::File, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_model_source_serde() {
        let json = serde_json::to_string(&ModelSource::Fitted).unwrap();
        assert_eq!(json, "\"fitted\"");
        let back: ModelSource = serde_json::from_str("\"file\"").unwrap();
        assert_eq!(back, ModelSource::File);
    }
}
