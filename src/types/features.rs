//! Request payload carrying Kepler Object of Interest features

use crate::feature_aligner::FeatureRecord;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Feature names accepted by the predict endpoint, in declaration order.
pub const FEATURE_NAMES: [&str; 14] = [
    "koi_period",
    "koi_duration",
    "koi_depth",
    "koi_prad",
    "koi_model_snr",
    "koi_snr",
    "koi_score",
    "koi_ror",
    "koi_impact",
    "koi_max_mult_ev",
    "koi_fpflag_ss",
    "koi_fpflag_co",
    "koi_fpflag_nt",
    "koi_fpflag_ec",
];

/// Transit and vetting features of one KOI. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExoplanetFeatures {
    /// Orbital period (days)
    pub koi_period: Option<f64>,
    /// Transit duration (hours)
    pub koi_duration: Option<f64>,
    /// Transit depth (ppm)
    pub koi_depth: Option<f64>,
    /// Planetary radius (Earth radii)
    pub koi_prad: Option<f64>,
    /// Transit signal-to-noise
    pub koi_model_snr: Option<f64>,
    pub koi_snr: Option<f64>,
    /// Disposition score
    pub koi_score: Option<f64>,
    /// Planet-star radius ratio
    pub koi_ror: Option<f64>,
    /// Impact parameter
    pub koi_impact: Option<f64>,
    pub koi_max_mult_ev: Option<f64>,
    /// Stellar eclipse flag
    #[serde(default, deserialize_with = "integral_flag")]
    pub koi_fpflag_ss: Option<i64>,
    /// Centroid offset flag
    #[serde(default, deserialize_with = "integral_flag")]
    pub koi_fpflag_co: Option<i64>,
    /// Not transit-like flag
    #[serde(default, deserialize_with = "integral_flag")]
    pub koi_fpflag_nt: Option<i64>,
    /// Ephemeris match flag
    #[serde(default, deserialize_with = "integral_flag")]
    pub koi_fpflag_ec: Option<i64>,
}

impl ExoplanetFeatures {
    /// Every declared field in declaration order, absent ones as `None`.
    pub fn to_record(&self) -> FeatureRecord {
        let values = [
            self.koi_period,
            self.koi_duration,
            self.koi_depth,
            self.koi_prad,
            self.koi_model_snr,
            self.koi_snr,
            self.koi_score,
            self.koi_ror,
            self.koi_impact,
            self.koi_max_mult_ev,
            self.koi_fpflag_ss.map(|v| v as f64),
            self.koi_fpflag_co.map(|v| v as f64),
            self.koi_fpflag_nt.map(|v| v as f64),
            self.koi_fpflag_ec.map(|v| v as f64),
        ];
        FEATURE_NAMES.into_iter().zip(values).collect()
    }

    /// Number of fields the caller supplied.
    pub fn supplied(&self) -> usize {
        let record = self.to_record();
        FEATURE_NAMES
            .iter()
            .filter(|name| matches!(record.get(name), Some(Some(_))))
            .count()
    }
}

/// Accepts an integer or an integral float such as `1.0`.
fn integral_flag<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Int(i64),
        Float(f64),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flag::Int(v)) => Ok(Some(v)),
        Some(Flag::Float(v))
            if v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 =>
        {
            Ok(Some(v as i64))
        }
        Some(Flag::Float(v)) => Err(de::Error::custom(format!(
            "expected an integer flag, found {v}"
        ))),
    }
}
