//! canonical isochrone cutoffs, in minutes.

/// the full cutoff set computed per origin. an origin is fully cached when
/// one band row exists per cutoff in this set.
pub const DEFAULT_CUTOFF_MINUTES: [u32; 8] = [15, 30, 45, 60, 90, 120, 150, 180];

/// cutoff probed by viewport listings to decide whether an origin has any
/// cached coverage at all.
pub const COVERAGE_PROBE_CUTOFF: u32 = 30;
