use geo::{CoordsIter, Geometry};
use std::collections::BTreeMap;

/// reachable-area polygons keyed by cutoff minutes. produced by the routing
/// client (one shortest-path tree projected at each cutoff) and read back
/// from the cache store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandSet {
    bands: BTreeMap<u32, Geometry<f64>>,
}

impl BandSet {
    pub fn new() -> BandSet {
        BandSet {
            bands: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, cutoff_minutes: u32, geometry: Geometry<f64>) {
        self.bands.insert(cutoff_minutes, geometry);
    }

    pub fn get(&self, cutoff_minutes: u32) -> Option<&Geometry<f64>> {
        self.bands.get(&cutoff_minutes)
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn cutoffs(&self) -> Vec<u32> {
        self.bands.keys().copied().collect()
    }

    /// iterates bands in ascending cutoff order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Geometry<f64>)> {
        self.bands.iter().map(|(c, g)| (*c, g))
    }

    /// moves all bands from `other` into this set, replacing shared cutoffs
    pub fn merge(&mut self, other: BandSet) {
        self.bands.extend(other.bands);
    }

    /// true when the band at `cutoff_minutes` is absent or carries no
    /// coordinates. an empty largest band marks a truncated search.
    pub fn is_blank_at(&self, cutoff_minutes: u32) -> bool {
        match self.bands.get(&cutoff_minutes) {
            None => true,
            Some(g) => g.coords_count() == 0,
        }
    }

    /// the number of pairwise-distinct geometries across bands. a healthy
    /// multi-cutoff response yields one shape per cutoff; a collapsed
    /// shortest-path-tree projection repeats a single shape.
    pub fn distinct_geometry_count(&self) -> usize {
        let mut distinct: Vec<&Geometry<f64>> = Vec::with_capacity(self.bands.len());
        for g in self.bands.values() {
            if !distinct.iter().any(|seen| *seen == g) {
                distinct.push(g);
            }
        }
        distinct.len()
    }
}

impl FromIterator<(u32, Geometry<f64>)> for BandSet {
    fn from_iter<I: IntoIterator<Item = (u32, Geometry<f64>)>>(iter: I) -> BandSet {
        BandSet {
            bands: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for BandSet {
    type Item = (u32, Geometry<f64>);
    type IntoIter = std::collections::btree_map::IntoIter<u32, Geometry<f64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.bands.into_iter()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use geo::{polygon, Geometry};

    fn square(size: f64) -> Geometry<f64> {
        Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: size, y: 0.0),
            (x: size, y: size),
            (x: 0.0, y: size),
            (x: 0.0, y: 0.0),
        ])
    }

    #[test]
    fn test_distinct_count_collapsed_response() {
        let bands: BandSet = [15, 30, 45, 60].into_iter().map(|c| (c, square(1.0))).collect();
        assert_eq!(bands.distinct_geometry_count(), 1);
    }

    #[test]
    fn test_distinct_count_healthy_response() {
        let bands: BandSet = [15u32, 30, 45, 60]
            .into_iter()
            .map(|c| (c, square(c as f64)))
            .collect();
        assert_eq!(bands.distinct_geometry_count(), 4);
    }

    #[test]
    fn test_blank_band_detection() {
        let mut bands = BandSet::new();
        bands.insert(15, square(1.0));
        bands.insert(
            180,
            Geometry::Polygon(geo::Polygon::new(geo::LineString::new(vec![]), vec![])),
        );
        assert!(!bands.is_blank_at(15));
        assert!(bands.is_blank_at(180));
        assert!(bands.is_blank_at(90));
    }

    #[test]
    fn test_merge_replaces_shared_cutoffs() {
        let mut a: BandSet = [(15, square(1.0)), (30, square(2.0))].into_iter().collect();
        let b: BandSet = [(30, square(9.0)), (45, square(3.0))].into_iter().collect();
        a.merge(b);
        assert_eq!(a.len(), 3);
        assert_eq!(a.get(30), Some(&square(9.0)));
    }
}
