use std::collections::HashMap;

use rand::Rng;

use threatwatch_types::ThreatEvent;

/// Map coordinates for source IPs. There is no geo lookup service behind
/// this; coordinates are random but stable per IP so map markers do not
/// jump between polls.
///
/// Owned by one engine instance. Engines never share a cache, so parallel
/// instances (and tests) cannot cross-contaminate.
#[derive(Debug, Default)]
pub struct GeoCache {
    coords: HashMap<String, [f64; 2]>,
}

impl GeoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn coordinates_for(&mut self, ip: &str) -> [f64; 2] {
        if let Some(coords) = self.coords.get(ip) {
            return *coords;
        }
        let mut rng = rand::thread_rng();
        let coords = [rng.gen_range(-70.0..70.0), rng.gen_range(-170.0..170.0)];
        self.coords.insert(ip.to_string(), coords);
        coords
    }

    /// Attach coordinates to every event in place.
    pub fn enrich(&mut self, events: &mut [ThreatEvent]) {
        for event in events {
            let coords = self.coordinates_for(&event.source_ip);
            event.coordinates = Some(coords);
        }
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_are_stable_per_ip() {
        let mut cache = GeoCache::new();
        let first = cache.coordinates_for("203.0.113.9");
        let second = cache.coordinates_for("203.0.113.9");
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_coordinates_in_plausible_range() {
        let mut cache = GeoCache::new();
        for i in 0..100 {
            let [lat, lng] = cache.coordinates_for(&format!("10.0.0.{i}"));
            assert!((-70.0..70.0).contains(&lat));
            assert!((-170.0..170.0).contains(&lng));
        }
    }

    #[test]
    fn test_instances_are_independent() {
        let mut a = GeoCache::new();
        let mut b = GeoCache::new();
        a.coordinates_for("10.1.1.1");
        assert!(b.is_empty());
    }
}
