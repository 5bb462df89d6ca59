//! Per-tile statistics.

/// Streaming min/max/mean/variance (Welford).
#[derive(Debug, Clone, Copy)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl RunningStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample; NaN is ignored.
    pub fn observe(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then_some(self.mean)
    }

    /// Population standard deviation.
    pub fn std_dev(&self) -> Option<f64> {
        (self.count > 0).then(|| (self.m2 / self.count as f64).sqrt())
    }
}

/// A row of `gpkg_2d_gridded_tile_ancillary`.
///
/// `min`, `max`, `mean` and `std_dev` describe the stored sample values of
/// the tile, before the tile and coverage transforms are applied. They are
/// `None` for a tile holding only no-data.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileStatistics {
    pub scale: f64,
    pub offset: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
}

impl TileStatistics {
    pub fn from_running(scale: f64, offset: f64, stats: &RunningStats) -> Self {
        Self {
            scale,
            offset,
            min: stats.min(),
            max: stats.max(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::new();
        for v in [2.0, 4.0, f64::NAN, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            stats.observe(v);
        }
        assert_eq!(stats.count(), 8);
        assert_eq!(stats.min(), Some(2.0));
        assert_eq!(stats.max(), Some(9.0));
        assert_relative_eq!(stats.mean().unwrap(), 5.0);
        assert_relative_eq!(stats.std_dev().unwrap(), 2.0);
    }

    #[test]
    fn test_empty_stats() {
        let stats = RunningStats::new();
        assert_eq!(stats.min(), None);
        assert_eq!(stats.std_dev(), None);

        let row = TileStatistics::from_running(1.0, 0.0, &stats);
        assert_eq!(row.mean, None);
        assert_eq!(row.scale, 1.0);
    }
}
