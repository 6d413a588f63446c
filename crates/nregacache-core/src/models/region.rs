//! District reference data consumed by the scheduler.

use serde::{Deserialize, Serialize};

use super::ids::RegionId;

/// State the built-in reference set belongs to.
pub const DEFAULT_STATE_CODE: &str = "09";
const DEFAULT_STATE_NAME: &str = "Uttar Pradesh";

/// Districts written to an empty registry.
const DEFAULT_DISTRICTS: &[(&str, &str)] = &[
    ("0901", "Agra"),
    ("0902", "Aligarh"),
    ("0903", "Allahabad"),
    ("0904", "Ambedkar Nagar"),
    ("0905", "Amethi"),
    ("0906", "Amroha"),
    ("0907", "Auraiya"),
    ("0908", "Azamgarh"),
    ("0909", "Baghpat"),
    ("0910", "Bahraich"),
    ("0911", "Ballia"),
    ("0912", "Balrampur"),
    ("0913", "Banda"),
    ("0914", "Barabanki"),
    ("0915", "Bareilly"),
    ("0916", "Basti"),
    ("0917", "Bhadohi"),
    ("0918", "Bijnor"),
    ("0919", "Budaun"),
    ("0920", "Bulandshahr"),
    ("0921", "Chandauli"),
    ("0922", "Chitrakoot"),
    ("0923", "Deoria"),
    ("0924", "Etah"),
    ("0925", "Etawah"),
    ("0926", "Faizabad"),
    ("0927", "Farrukhabad"),
    ("0928", "Fatehpur"),
    ("0929", "Firozabad"),
    ("0930", "Gautam Buddha Nagar"),
    ("0931", "Ghaziabad"),
    ("0932", "Ghazipur"),
    ("0933", "Gonda"),
    ("0934", "Gorakhpur"),
    ("0935", "Hamirpur"),
    ("0936", "Hapur"),
    ("0937", "Hardoi"),
    ("0938", "Hathras"),
    ("0939", "Jalaun"),
    ("0940", "Jaunpur"),
    ("0941", "Jhusi"),
    ("0942", "Kannauj"),
    ("0943", "Kanpur Dehat"),
    ("0944", "Kanpur Nagar"),
    ("0945", "Kasganj"),
    ("0946", "Kaushambi"),
    ("0947", "Kheri"),
    ("0948", "Kushinagar"),
    ("0949", "Lalitpur"),
    ("0950", "Lucknow"),
];

/// An administrative district and the state it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Region {
    #[cfg_attr(feature = "ts", ts(type = "string"))]
    pub region_id: RegionId,
    /// State code.
    pub parent_region_id: Option<String>,
    pub name: String,
    pub parent_name: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Region {
    pub fn new(region_id: RegionId, name: impl Into<String>) -> Self {
        let parent = region_id.state_code().to_string();
        Self {
            region_id,
            parent_region_id: Some(parent),
            name: name.into(),
            parent_name: None,
            active: true,
        }
    }

    pub fn in_state(&self, state_code: &str) -> bool {
        self.parent_region_id.as_deref() == Some(state_code)
    }
}

/// The built-in reference set used to seed an empty registry.
pub fn default_regions() -> Vec<Region> {
    DEFAULT_DISTRICTS
        .iter()
        .filter_map(|(code, name)| {
            let id = RegionId::parse(code).ok()?;
            let mut region = Region::new(id, *name);
            region.parent_name = Some(DEFAULT_STATE_NAME.to_string());
            Some(region)
        })
        .collect()
}
