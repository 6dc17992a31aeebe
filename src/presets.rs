//! Built-in list of monitored Indian cities.
//!
//! Searched in memory, no network.

use crate::models::Location;

/// A preset entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Preset {
    pub name: &'static str,
    pub region: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<&Preset> for Location {
    fn from(p: &Preset) -> Self {
        let mut location = Location::new(p.name, p.latitude, p.longitude);
        location.region = Some(p.region.to_string());
        location.kind = Some("city".to_string());
        location
    }
}

/// Preset cities, grouped loosely by region.
pub const PRESETS: &[Preset] = &[
    Preset { name: "Mumbai", region: "Maharashtra", latitude: 19.0760, longitude: 72.8777 },
    Preset { name: "Pune", region: "Maharashtra", latitude: 18.5204, longitude: 73.8567 },
    Preset { name: "Nagpur", region: "Maharashtra", latitude: 21.1458, longitude: 79.0882 },
    Preset { name: "Nashik", region: "Maharashtra", latitude: 19.9975, longitude: 73.7898 },
    Preset { name: "Delhi", region: "Delhi", latitude: 28.7041, longitude: 77.1025 },
    Preset { name: "New Delhi", region: "Delhi", latitude: 28.6139, longitude: 77.2090 },
    Preset { name: "Bengaluru", region: "Karnataka", latitude: 12.9716, longitude: 77.5946 },
    Preset { name: "Mysuru", region: "Karnataka", latitude: 12.2958, longitude: 76.6394 },
    Preset { name: "Mangaluru", region: "Karnataka", latitude: 12.9141, longitude: 74.8560 },
    Preset { name: "Chennai", region: "Tamil Nadu", latitude: 13.0827, longitude: 80.2707 },
    Preset { name: "Coimbatore", region: "Tamil Nadu", latitude: 11.0168, longitude: 76.9558 },
    Preset { name: "Madurai", region: "Tamil Nadu", latitude: 9.9252, longitude: 78.1198 },
    Preset { name: "Kolkata", region: "West Bengal", latitude: 22.5726, longitude: 88.3639 },
    Preset { name: "Darjeeling", region: "West Bengal", latitude: 27.0410, longitude: 88.2663 },
    Preset { name: "Hyderabad", region: "Telangana", latitude: 17.3850, longitude: 78.4867 },
    Preset { name: "Visakhapatnam", region: "Andhra Pradesh", latitude: 17.6868, longitude: 83.2185 },
    Preset { name: "Vijayawada", region: "Andhra Pradesh", latitude: 16.5062, longitude: 80.6480 },
    Preset { name: "Ahmedabad", region: "Gujarat", latitude: 23.0225, longitude: 72.5714 },
    Preset { name: "Surat", region: "Gujarat", latitude: 21.1702, longitude: 72.8311 },
    Preset { name: "Bhuj", region: "Gujarat", latitude: 23.2420, longitude: 69.6669 },
    Preset { name: "Jaipur", region: "Rajasthan", latitude: 26.9124, longitude: 75.7873 },
    Preset { name: "Jodhpur", region: "Rajasthan", latitude: 26.2389, longitude: 73.0243 },
    Preset { name: "Lucknow", region: "Uttar Pradesh", latitude: 26.8467, longitude: 80.9462 },
    Preset { name: "Varanasi", region: "Uttar Pradesh", latitude: 25.3176, longitude: 82.9739 },
    Preset { name: "Kanpur", region: "Uttar Pradesh", latitude: 26.4499, longitude: 80.3319 },
    Preset { name: "Patna", region: "Bihar", latitude: 25.5941, longitude: 85.1376 },
    Preset { name: "Bhopal", region: "Madhya Pradesh", latitude: 23.2599, longitude: 77.4126 },
    Preset { name: "Indore", region: "Madhya Pradesh", latitude: 22.7196, longitude: 75.8577 },
    Preset { name: "Bhubaneswar", region: "Odisha", latitude: 20.2961, longitude: 85.8245 },
    Preset { name: "Puri", region: "Odisha", latitude: 19.8135, longitude: 85.8312 },
    Preset { name: "Guwahati", region: "Assam", latitude: 26.1445, longitude: 91.7362 },
    Preset { name: "Dibrugarh", region: "Assam", latitude: 27.4728, longitude: 94.9120 },
    Preset { name: "Shillong", region: "Meghalaya", latitude: 25.5788, longitude: 91.8933 },
    Preset { name: "Imphal", region: "Manipur", latitude: 24.8170, longitude: 93.9368 },
    Preset { name: "Gangtok", region: "Sikkim", latitude: 27.3389, longitude: 88.6065 },
    Preset { name: "Kochi", region: "Kerala", latitude: 9.9312, longitude: 76.2673 },
    Preset { name: "Thiruvananthapuram", region: "Kerala", latitude: 8.5241, longitude: 76.9366 },
    Preset { name: "Wayanad", region: "Kerala", latitude: 11.6854, longitude: 76.1320 },
    Preset { name: "Panaji", region: "Goa", latitude: 15.4909, longitude: 73.8278 },
    Preset { name: "Chandigarh", region: "Chandigarh", latitude: 30.7333, longitude: 76.7794 },
    Preset { name: "Shimla", region: "Himachal Pradesh", latitude: 31.1048, longitude: 77.1734 },
    Preset { name: "Manali", region: "Himachal Pradesh", latitude: 32.2432, longitude: 77.1892 },
    Preset { name: "Dehradun", region: "Uttarakhand", latitude: 30.3165, longitude: 78.0322 },
    Preset { name: "Joshimath", region: "Uttarakhand", latitude: 30.5550, longitude: 79.5643 },
    Preset { name: "Srinagar", region: "Jammu and Kashmir", latitude: 34.0837, longitude: 74.7973 },
    Preset { name: "Leh", region: "Ladakh", latitude: 34.1526, longitude: 77.5771 },
    Preset { name: "Port Blair", region: "Andaman and Nicobar Islands", latitude: 11.6234, longitude: 92.7265 },
    Preset { name: "Raipur", region: "Chhattisgarh", latitude: 21.2514, longitude: 81.6296 },
    Preset { name: "Ranchi", region: "Jharkhand", latitude: 23.3441, longitude: 85.3096 },
];

/// Case-insensitive substring match on name or region.
///
/// A blank query returns every preset.
#[must_use]
pub fn search_presets(query: &str) -> Vec<Location> {
    let query = query.trim().to_lowercase();

    PRESETS
        .iter()
        .filter(|p| {
            query.is_empty()
                || p.name.to_lowercase().contains(&query)
                || p.region.to_lowercase().contains(&query)
        })
        .map(Location::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_query_returns_all() {
        assert_eq!(search_presets("").len(), PRESETS.len());
        assert_eq!(search_presets("   ").len(), PRESETS.len());
    }

    #[test]
    fn test_match_by_name_ignores_case() {
        let hits = search_presets("mUmB");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "Mumbai");
        assert_eq!(hits[0].region.as_deref(), Some("Maharashtra"));
    }

    #[test]
    fn test_match_by_region() {
        let hits = search_presets("kerala");
        let names: Vec<&str> = hits.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["Kochi", "Thiruvananthapuram", "Wayanad"]);
    }

    #[test]
    fn test_no_match() {
        assert!(search_presets("atlantis").is_empty());
    }

    #[test]
    fn test_presets_are_on_the_globe() {
        for preset in PRESETS {
            assert!(Location::from(preset).validate().is_ok(), "{}", preset.name);
        }
    }
}
