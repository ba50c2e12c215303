//! KOI table rows served by the listing endpoint

use serde::{Deserialize, Serialize};

/// One row of the cumulative KOI table, restricted to the columns the UI
/// displays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KoiRow {
    pub kepid: i64,
    pub kepoi_name: Option<String>,
    pub koi_disposition: Option<String>,
    pub koi_period: Option<f64>,
    pub koi_duration: Option<f64>,
    pub koi_depth: Option<f64>,
    pub koi_prad: Option<f64>,
    pub koi_model_snr: Option<f64>,
    pub koi_snr: Option<f64>,
    pub koi_score: Option<f64>,
    pub koi_ror: Option<f64>,
    pub koi_impact: Option<f64>,
    pub koi_max_mult_ev: Option<f64>,
    pub koi_fpflag_ss: Option<i64>,
    pub koi_fpflag_co: Option<i64>,
    pub koi_fpflag_nt: Option<i64>,
    pub koi_fpflag_ec: Option<i64>,
}
