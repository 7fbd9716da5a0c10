use super::{schema, StoreError};
use chrono::{DateTime, NaiveTime, Utc};
use geo::{BoundingRect, Geometry, MultiPolygon, Point, Rect};
use itertools::Itertools;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use tripshed_core::model::cutoff::{COVERAGE_PROBE_CUTOFF, DEFAULT_CUTOFF_MINUTES};
use tripshed_core::model::{
    BandSet, BatchStatus, CacheKey, DayType, Intersection, TransitStop, TravelMode,
};
use tripshed_core::util::{geo_ops, wkb_codec};

/// band geometries are simplified to this tolerance before serving; roughly
/// 11 m at the region's latitude, enough to cap payload size without a
/// visible change on a city-scale map
const SIMPLIFY_TOLERANCE_DEGREES: f64 = 0.0001;

/// candidates pulled by the index-friendly nearest scan before the
/// great-circle refinement pass
const NEAREST_CANDIDATES: i64 = 8;

const UPSERT_BAND_SQL: &str = r#"
INSERT INTO isochrone_bands
    (origin_id, mode, departure_time, day_type, cutoff_minutes, geometry, geometry_unclipped, computed_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
ON CONFLICT (origin_id, mode, departure_time, day_type, cutoff_minutes)
DO UPDATE SET geometry = excluded.geometry,
              geometry_unclipped = excluded.geometry_unclipped,
              computed_at = excluded.computed_at
"#;

/// squared equirectangular degrees with longitude scaled by cos(lat); close
/// enough at city scale to rank candidates for the exact refinement
const NEAREST_SQL: &str = r#"
SELECT i.id, i.osm_node_id, i.name, i.lat, i.lng, i.borough, i.sample_group
FROM intersections i
WHERE EXISTS (
    SELECT 1 FROM isochrone_bands b
    WHERE b.origin_id = i.id
      AND b.mode = ?4 AND b.departure_time = ?5 AND b.day_type = ?6)
ORDER BY ((i.lat - ?1) * (i.lat - ?1))
       + (((i.lng - ?2) * ?3) * ((i.lng - ?2) * ?3))
LIMIT ?7
"#;

const NEAREST_BOTH_SQL: &str = r#"
SELECT i.id, i.osm_node_id, i.name, i.lat, i.lng, i.borough, i.sample_group
FROM intersections i
WHERE EXISTS (
    SELECT 1 FROM isochrone_bands b
    WHERE b.origin_id = i.id
      AND b.mode = ?4 AND b.departure_time = ?6 AND b.day_type = ?7)
  AND EXISTS (
    SELECT 1 FROM isochrone_bands b
    WHERE b.origin_id = i.id
      AND b.mode = ?5 AND b.departure_time = ?6 AND b.day_type = ?7)
ORDER BY ((i.lat - ?1) * (i.lat - ?1))
       + (((i.lng - ?2) * ?3) * ((i.lng - ?2) * ?3))
LIMIT ?8
"#;

const VIEWPORT_SQL: &str = r#"
SELECT i.id, i.osm_node_id, i.name, i.lat, i.lng, i.borough, i.sample_group,
       EXISTS (
           SELECT 1 FROM isochrone_bands b
           WHERE b.origin_id = i.id
             AND b.mode = ?5 AND b.departure_time = ?6 AND b.day_type = ?7
             AND b.cutoff_minutes = ?8)
FROM intersections i
WHERE i.lat BETWEEN ?1 AND ?2 AND i.lng BETWEEN ?3 AND ?4
ORDER BY i.id
LIMIT ?9
"#;

const VIEWPORT_SAMPLED_SQL: &str = r#"
SELECT i.id, i.osm_node_id, i.name, i.lat, i.lng, i.borough, i.sample_group,
       EXISTS (
           SELECT 1 FROM isochrone_bands b
           WHERE b.origin_id = i.id
             AND b.mode = ?5 AND b.departure_time = ?6 AND b.day_type = ?7
             AND b.cutoff_minutes = ?8)
FROM intersections i
WHERE i.lat BETWEEN ?1 AND ?2 AND i.lng BETWEEN ?3 AND ?4
  AND i.sample_group = ?10
ORDER BY i.id
LIMIT ?9
"#;

/// geographic bounding box in lat/lng order as the viewport endpoints hand
/// it over
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

/// viewport listing row: an origin plus whether any cached coverage exists
/// for the requested cache key
#[derive(Debug, Clone, Serialize)]
pub struct IntersectionStatus {
    #[serde(flatten)]
    pub intersection: Intersection,
    pub is_computed: bool,
}

/// nearest origin carrying bands under both comparison modes
#[derive(Debug, Clone)]
pub struct ModeComparison {
    pub intersection: Intersection,
    pub transit: BandSet,
    pub bike: BandSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModeBandStats {
    pub mode: String,
    pub band_rows: i64,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_intersections: i64,
    pub bands: Vec<ModeBandStats>,
    pub statuses: BTreeMap<String, i64>,
}

/// knobs resolved from configuration at store construction
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// full cutoff set; an origin is complete with one band row per entry
    pub cutoffs: Vec<u32>,
    /// region tags eligible for batching, highest priority first
    pub borough_priority: Vec<String>,
    /// age beyond which a `processing` row counts as abandoned
    pub stale_horizon_secs: u64,
}

impl Default for StoreOptions {
    fn default() -> StoreOptions {
        StoreOptions {
            cutoffs: DEFAULT_CUTOFF_MINUTES.to_vec(),
            borough_priority: vec![
                String::from("Manhattan"),
                String::from("Brooklyn"),
                String::from("Queens"),
                String::from("Bronx"),
                String::from("Staten Island"),
            ],
            stale_horizon_secs: 120,
        }
    }
}

/// geospatial persistence layer. sole owner of SQL and geometry encoding:
/// callers see typed records and `geo` geometries, never rows or WKB.
pub struct CacheStore {
    conn: Mutex<Connection>,
    options: StoreOptions,
    /// outer None: not yet loaded; inner None: no land boundary row
    land_cache: Mutex<Option<Option<Arc<MultiPolygon<f64>>>>>,
    /// band coverage is static outside batch runs, so the extent is read once
    bbox_cache: OnceLock<Option<Rect<f64>>>,
}

impl CacheStore {
    pub fn open(path: &Path, options: StoreOptions) -> Result<CacheStore, StoreError> {
        CacheStore::from_connection(Connection::open(path)?, options)
    }

    pub fn open_in_memory(options: StoreOptions) -> Result<CacheStore, StoreError> {
        CacheStore::from_connection(Connection::open_in_memory()?, options)
    }

    fn from_connection(conn: Connection, options: StoreOptions) -> Result<CacheStore, StoreError> {
        conn.execute_batch(schema::SCHEMA)?;
        Ok(CacheStore {
            conn: Mutex::new(conn),
            options,
            land_cache: Mutex::new(None),
            bbox_cache: OnceLock::new(),
        })
    }

    pub fn cutoffs(&self) -> &[u32] {
        &self.options.cutoffs
    }

    fn full_band_count(&self) -> i64 {
        self.options.cutoffs.len() as i64
    }

    // --- ingest -----------------------------------------------------------

    pub fn insert_intersections(&self, rows: &[Intersection]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO intersections (id, osm_node_id, name, lat, lng, borough, sample_group)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.id,
                    row.osm_node_id,
                    row.name,
                    row.lat,
                    row.lng,
                    row.borough,
                    row.sample_group
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn insert_transit_stops(&self, rows: &[TransitStop]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO transit_stops (id, gtfs_stop_id, stop_name, lat, lng, stop_type, agency)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.id,
                    row.gtfs_stop_id,
                    row.stop_name,
                    row.lat,
                    row.lng,
                    row.stop_type,
                    row.agency
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn set_land_boundary(&self, land: &MultiPolygon<f64>) -> Result<(), StoreError> {
        let bytes = wkb_codec::encode(&Geometry::MultiPolygon(land.clone()))
            .map_err(StoreError::from)?;
        {
            let conn = self.conn.lock();
            conn.execute("DELETE FROM land_boundary", [])?;
            conn.execute(
                "INSERT INTO land_boundary (geometry) VALUES (?1)",
                params![bytes],
            )?;
        }
        *self.land_cache.lock() = None;
        Ok(())
    }

    fn land_boundary(&self) -> Result<Option<Arc<MultiPolygon<f64>>>, StoreError> {
        {
            let cache = self.land_cache.lock();
            if let Some(loaded) = cache.as_ref() {
                return Ok(loaded.clone());
            }
        }
        let loaded = {
            let conn = self.conn.lock();
            let bytes: Option<Vec<u8>> = conn
                .query_row("SELECT geometry FROM land_boundary LIMIT 1", [], |row| {
                    row.get(0)
                })
                .optional()?;
            match bytes {
                None => None,
                Some(bytes) => {
                    let geometry = wkb_codec::decode(bytes).map_err(StoreError::from)?;
                    geo_ops::as_multi_polygon(&geometry).map(Arc::new)
                }
            }
        };
        *self.land_cache.lock() = Some(loaded.clone());
        Ok(loaded)
    }

    // --- band reads -------------------------------------------------------

    pub fn intersections_in_viewport(
        &self,
        viewport: &Viewport,
        limit: u32,
        key: &CacheKey,
        sample_group: Option<i64>,
    ) -> Result<Vec<IntersectionStatus>, StoreError> {
        let conn = self.conn.lock();
        let map_row = |row: &Row<'_>| -> rusqlite::Result<IntersectionStatus> {
            Ok(IntersectionStatus {
                intersection: intersection_from_row(row)?,
                is_computed: row.get(7)?,
            })
        };
        let rows = match sample_group {
            Some(group) => {
                let mut stmt = conn.prepare(VIEWPORT_SAMPLED_SQL)?;
                let rows = stmt.query_map(
                    params![
                        viewport.min_lat,
                        viewport.max_lat,
                        viewport.min_lng,
                        viewport.max_lng,
                        key.mode.as_str(),
                        key.departure_string(),
                        key.day_type.as_str(),
                        COVERAGE_PROBE_CUTOFF,
                        limit as i64,
                        group
                    ],
                    map_row,
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(VIEWPORT_SQL)?;
                let rows = stmt.query_map(
                    params![
                        viewport.min_lat,
                        viewport.max_lat,
                        viewport.min_lng,
                        viewport.max_lng,
                        key.mode.as_str(),
                        key.departure_string(),
                        key.day_type.as_str(),
                        COVERAGE_PROBE_CUTOFF,
                        limit as i64
                    ],
                    map_row,
                )?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(rows)
    }

    pub fn nearest_with_isochrone(
        &self,
        lat: f64,
        lng: f64,
        key: &CacheKey,
    ) -> Result<Option<(Intersection, BandSet)>, StoreError> {
        let candidates = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(NEAREST_SQL)?;
            let rows = stmt.query_map(
                params![
                    lat,
                    lng,
                    lat.to_radians().cos(),
                    key.mode.as_str(),
                    key.departure_string(),
                    key.day_type.as_str(),
                    NEAREST_CANDIDATES
                ],
                intersection_from_row,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let Some(nearest) = pick_nearest(candidates, lat, lng) else {
            return Ok(None);
        };
        let bands = self.load_bands(
            nearest.id,
            key,
            "geometry",
            Some(SIMPLIFY_TOLERANCE_DEGREES),
        )?;
        Ok(Some((nearest, bands)))
    }

    pub fn nearest_with_both_modes(
        &self,
        lat: f64,
        lng: f64,
        departure: NaiveTime,
        day_type: DayType,
    ) -> Result<Option<ModeComparison>, StoreError> {
        let transit_key = CacheKey::new(TravelMode::Transit, departure, day_type);
        let bike_key = transit_key.with_mode(TravelMode::Bike);
        let candidates = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(NEAREST_BOTH_SQL)?;
            let rows = stmt.query_map(
                params![
                    lat,
                    lng,
                    lat.to_radians().cos(),
                    TravelMode::Transit.as_str(),
                    TravelMode::Bike.as_str(),
                    transit_key.departure_string(),
                    day_type.as_str(),
                    NEAREST_CANDIDATES
                ],
                intersection_from_row,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let Some(nearest) = pick_nearest(candidates, lat, lng) else {
            return Ok(None);
        };
        let transit = self.load_bands(
            nearest.id,
            &transit_key,
            "geometry",
            Some(SIMPLIFY_TOLERANCE_DEGREES),
        )?;
        let bike = self.load_bands(
            nearest.id,
            &bike_key,
            "geometry",
            Some(SIMPLIFY_TOLERANCE_DEGREES),
        )?;
        Ok(Some(ModeComparison {
            intersection: nearest,
            transit,
            bike,
        }))
    }

    /// serving read of the clipped bands for one origin
    pub fn cached_isochrone(
        &self,
        origin_id: i64,
        key: &CacheKey,
    ) -> Result<Option<BandSet>, StoreError> {
        let bands = self.load_bands(origin_id, key, "geometry", Some(SIMPLIFY_TOLERANCE_DEGREES))?;
        if bands.is_empty() {
            return Ok(None);
        }
        Ok(Some(bands))
    }

    /// maintenance read of the raw pre-clip bands for one origin
    pub fn unclipped_isochrone(
        &self,
        origin_id: i64,
        key: &CacheKey,
    ) -> Result<Option<BandSet>, StoreError> {
        let bands = self.load_bands(origin_id, key, "geometry_unclipped", None)?;
        if bands.is_empty() {
            return Ok(None);
        }
        Ok(Some(bands))
    }

    fn load_bands(
        &self,
        origin_id: i64,
        key: &CacheKey,
        geometry_column: &str,
        simplify_tolerance: Option<f64>,
    ) -> Result<BandSet, StoreError> {
        // column name is one of two compile-time constants, never user input
        let sql = format!(
            "SELECT cutoff_minutes, {geometry_column} FROM isochrone_bands
             WHERE origin_id = ?1 AND mode = ?2 AND departure_time = ?3 AND day_type = ?4
             ORDER BY cutoff_minutes"
        );
        let raw = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![
                    origin_id,
                    key.mode.as_str(),
                    key.departure_string(),
                    key.day_type.as_str()
                ],
                |row| Ok((row.get::<_, u32>(0)?, row.get::<_, Vec<u8>>(1)?)),
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let mut bands = BandSet::new();
        for (cutoff, bytes) in raw {
            let geometry = wkb_codec::decode(bytes).map_err(StoreError::from)?;
            let geometry = match simplify_tolerance {
                Some(tolerance) => geo_ops::simplify_geometry(&geometry, tolerance),
                None => geometry,
            };
            bands.insert(cutoff, geometry);
        }
        Ok(bands)
    }

    // --- band writes ------------------------------------------------------

    /// upserts one row per band. clipping follows the land boundary when one
    /// is loaded; an empty or irreparable intersection keeps the raw shape.
    /// the eight upserts are independent on purpose: an interrupted save
    /// leaves a short band set that the pending selection re-queues.
    pub fn save_isochrone(
        &self,
        origin_id: i64,
        key: &CacheKey,
        bands: &BandSet,
    ) -> Result<(), StoreError> {
        let land = self.land_boundary()?;
        let computed_at = Utc::now();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(UPSERT_BAND_SQL)?;
        for (cutoff, geometry) in bands.iter() {
            let clipped = match &land {
                Some(land) => geo_ops::clip_to_land(geometry, land),
                None => geometry.clone(),
            };
            let geometry_wkb = wkb_codec::encode(&clipped).map_err(StoreError::from)?;
            let unclipped_wkb = wkb_codec::encode(geometry).map_err(StoreError::from)?;
            stmt.execute(params![
                origin_id,
                key.mode.as_str(),
                key.departure_string(),
                key.day_type.as_str(),
                cutoff,
                geometry_wkb,
                unclipped_wkb,
                computed_at
            ])?;
        }
        Ok(())
    }

    /// maintenance delete of a single band row
    pub fn delete_band(
        &self,
        origin_id: i64,
        key: &CacheKey,
        cutoff_minutes: u32,
    ) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let deleted = conn.execute(
            "DELETE FROM isochrone_bands
             WHERE origin_id = ?1 AND mode = ?2 AND departure_time = ?3 AND day_type = ?4
               AND cutoff_minutes = ?5",
            params![
                origin_id,
                key.mode.as_str(),
                key.departure_string(),
                key.day_type.as_str(),
                cutoff_minutes
            ],
        )?;
        Ok(deleted)
    }

    // --- batch queue ------------------------------------------------------

    fn pending_sql(&self) -> String {
        // borough names come from operator configuration, never request input
        let quote = |borough: &String| format!("'{}'", borough.replace('\'', "''"));
        let in_list = self.options.borough_priority.iter().map(quote).join(", ");
        let priority_case = self
            .options
            .borough_priority
            .iter()
            .enumerate()
            .map(|(rank, borough)| format!("WHEN {} THEN {rank}", quote(borough)))
            .join(" ");
        format!(
            r#"
SELECT i.id, i.osm_node_id, i.name, i.lat, i.lng, i.borough, i.sample_group
FROM intersections i
LEFT JOIN batch_status bs
    ON bs.intersection_id = i.id
   AND bs.mode = ?1 AND bs.departure_time = ?2 AND bs.day_type = ?3
WHERE i.borough IN ({in_list})
  AND (bs.status IS NULL
       OR bs.status IN ('pending', 'completed')
       OR (bs.status = 'processing' AND bs.started_at < ?4))
  AND (SELECT COUNT(*) FROM isochrone_bands b
       WHERE b.origin_id = i.id
         AND b.mode = ?1 AND b.departure_time = ?2 AND b.day_type = ?3) < ?5
ORDER BY CASE i.borough {priority_case} ELSE {fallback_rank} END, i.id
LIMIT ?6
"#,
            fallback_rank = self.options.borough_priority.len()
        )
    }

    /// selects up to `batch_size` origins still owed bands for this cache
    /// key, highest-priority borough first, ties by origin id. `failed`
    /// origins stay out until `reset_failed`; abandoned `processing` rows
    /// re-enter once older than the stale horizon.
    pub fn get_pending(
        &self,
        key: &CacheKey,
        batch_size: u32,
    ) -> Result<Vec<Intersection>, StoreError> {
        let stale_before =
            Utc::now() - chrono::Duration::seconds(self.options.stale_horizon_secs as i64);
        let sql = self.pending_sql();
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                key.mode.as_str(),
                key.departure_string(),
                key.day_type.as_str(),
                stale_before,
                self.full_band_count(),
                batch_size as i64
            ],
            intersection_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn mark_processing(&self, origin_id: i64, key: &CacheKey) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO batch_status
    (intersection_id, mode, departure_time, day_type, status, started_at, completed_at, error_message)
VALUES (?1, ?2, ?3, ?4, 'processing', ?5, NULL, NULL)
ON CONFLICT (intersection_id, mode, departure_time, day_type)
DO UPDATE SET status = 'processing',
              started_at = excluded.started_at,
              completed_at = NULL,
              error_message = NULL
"#,
            params![
                origin_id,
                key.mode.as_str(),
                key.departure_string(),
                key.day_type.as_str(),
                Utc::now()
            ],
        )?;
        Ok(())
    }

    pub fn mark_completed(&self, origin_id: i64, key: &CacheKey) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO batch_status
    (intersection_id, mode, departure_time, day_type, status, started_at, completed_at, error_message)
VALUES (?1, ?2, ?3, ?4, 'completed', NULL, ?5, NULL)
ON CONFLICT (intersection_id, mode, departure_time, day_type)
DO UPDATE SET status = 'completed',
              completed_at = excluded.completed_at,
              error_message = NULL
"#,
            params![
                origin_id,
                key.mode.as_str(),
                key.departure_string(),
                key.day_type.as_str(),
                Utc::now()
            ],
        )?;
        Ok(())
    }

    pub fn mark_failed(
        &self,
        origin_id: i64,
        key: &CacheKey,
        error_message: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO batch_status
    (intersection_id, mode, departure_time, day_type, status, started_at, completed_at, error_message)
VALUES (?1, ?2, ?3, ?4, 'failed', NULL, NULL, ?5)
ON CONFLICT (intersection_id, mode, departure_time, day_type)
DO UPDATE SET status = 'failed',
              error_message = excluded.error_message
"#,
            params![
                origin_id,
                key.mode.as_str(),
                key.departure_string(),
                key.day_type.as_str(),
                error_message
            ],
        )?;
        Ok(())
    }

    /// operator action: move every failed origin for this key back to
    /// pending. returns how many rows moved.
    pub fn reset_failed(&self, key: &CacheKey) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let moved = conn.execute(
            "UPDATE batch_status
             SET status = 'pending', error_message = NULL
             WHERE mode = ?1 AND departure_time = ?2 AND day_type = ?3 AND status = 'failed'",
            params![
                key.mode.as_str(),
                key.departure_string(),
                key.day_type.as_str()
            ],
        )?;
        Ok(moved)
    }

    pub fn batch_status(
        &self,
        origin_id: i64,
        key: &CacheKey,
    ) -> Result<Option<(BatchStatus, Option<String>)>, StoreError> {
        let conn = self.conn.lock();
        let row: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT status, error_message FROM batch_status
                 WHERE intersection_id = ?1 AND mode = ?2 AND departure_time = ?3 AND day_type = ?4",
                params![
                    origin_id,
                    key.mode.as_str(),
                    key.departure_string(),
                    key.day_type.as_str()
                ],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            None => Ok(None),
            Some((status, error_message)) => {
                let status = BatchStatus::ALL
                    .into_iter()
                    .find(|s| s.as_str() == status)
                    .ok_or(StoreError::UnexpectedStatus(status))?;
                Ok(Some((status, error_message)))
            }
        }
    }

    // --- counters & stats -------------------------------------------------

    pub fn origin_count(&self) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        Ok(conn.query_row("SELECT COUNT(*) FROM intersections", [], |row| row.get(0))?)
    }

    /// origins inside the configured priority boroughs; the denominator for
    /// batch progress reporting
    pub fn priority_origin_count(&self) -> Result<i64, StoreError> {
        let quote = |borough: &String| format!("'{}'", borough.replace('\'', "''"));
        let in_list = self.options.borough_priority.iter().map(quote).join(", ");
        let sql = format!("SELECT COUNT(*) FROM intersections WHERE borough IN ({in_list})");
        let conn = self.conn.lock();
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// origins holding a full band set under this key
    pub fn completed_origin_count(&self, key: &CacheKey) -> Result<i64, StoreError> {
        let conn = self.conn.lock();
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM (
                 SELECT b.origin_id FROM isochrone_bands b
                 WHERE b.mode = ?1 AND b.departure_time = ?2 AND b.day_type = ?3
                 GROUP BY b.origin_id
                 HAVING COUNT(*) >= ?4)",
            params![
                key.mode.as_str(),
                key.departure_string(),
                key.day_type.as_str(),
                self.full_band_count()
            ],
            |row| row.get(0),
        )?)
    }

    pub fn stats(&self, key: &CacheKey) -> Result<StoreStats, StoreError> {
        let conn = self.conn.lock();
        let total_intersections: i64 =
            conn.query_row("SELECT COUNT(*) FROM intersections", [], |row| row.get(0))?;

        let mut stmt = conn.prepare(
            "SELECT mode, COUNT(*), MIN(computed_at), MAX(computed_at)
             FROM isochrone_bands GROUP BY mode ORDER BY mode",
        )?;
        let bands = stmt
            .query_map([], |row| {
                Ok(ModeBandStats {
                    mode: row.get(0)?,
                    band_rows: row.get(1)?,
                    oldest: row.get(2)?,
                    newest: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM batch_status
             WHERE mode = ?1 AND departure_time = ?2 AND day_type = ?3
             GROUP BY status",
        )?;
        let statuses = stmt
            .query_map(
                params![
                    key.mode.as_str(),
                    key.departure_string(),
                    key.day_type.as_str()
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

        Ok(StoreStats {
            total_intersections,
            bands,
            statuses,
        })
    }

    // --- transit stops ----------------------------------------------------

    pub fn transit_stops_in_viewport(
        &self,
        viewport: &Viewport,
        limit: u32,
    ) -> Result<Vec<TransitStop>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, gtfs_stop_id, stop_name, lat, lng, stop_type, agency
             FROM transit_stops
             WHERE lat BETWEEN ?1 AND ?2 AND lng BETWEEN ?3 AND ?4
             ORDER BY id
             LIMIT ?5",
        )?;
        let rows = stmt.query_map(
            params![
                viewport.min_lat,
                viewport.max_lat,
                viewport.min_lng,
                viewport.max_lng,
                limit as i64
            ],
            transit_stop_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// stops within a great-circle radius, nearest first, paired with their
    /// distance in meters
    pub fn transit_stops_near(
        &self,
        lat: f64,
        lng: f64,
        radius_m: f64,
    ) -> Result<Vec<(TransitStop, f64)>, StoreError> {
        let lat_delta = radius_m / 111_320.0;
        let lng_delta = radius_m / (111_320.0 * lat.to_radians().cos().max(0.01));
        let candidates = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare(
                "SELECT id, gtfs_stop_id, stop_name, lat, lng, stop_type, agency
                 FROM transit_stops
                 WHERE lat BETWEEN ?1 AND ?2 AND lng BETWEEN ?3 AND ?4",
            )?;
            let rows = stmt.query_map(
                params![
                    lat - lat_delta,
                    lat + lat_delta,
                    lng - lng_delta,
                    lng + lng_delta
                ],
                transit_stop_from_row,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let origin = Point::new(lng, lat);
        let mut within: Vec<(TransitStop, f64)> = candidates
            .into_iter()
            .map(|stop| {
                let distance = geo_ops::distance_meters(origin, stop.point());
                (stop, distance)
            })
            .filter(|(_, distance)| *distance <= radius_m)
            .collect();
        within.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(within)
    }

    // --- coverage extent --------------------------------------------------

    /// bounding box over every band geometry, computed once per process
    pub fn coverage_bbox(&self) -> Result<Option<Rect<f64>>, StoreError> {
        if let Some(cached) = self.bbox_cache.get() {
            return Ok(*cached);
        }
        let blobs = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare("SELECT geometry FROM isochrone_bands")?;
            let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let mut extent: Option<Rect<f64>> = None;
        for bytes in blobs {
            let geometry = wkb_codec::decode(bytes).map_err(StoreError::from)?;
            if let Some(bounds) = geometry.bounding_rect() {
                extent = Some(match extent {
                    None => bounds,
                    Some(current) => merge_rects(current, bounds),
                });
            }
        }
        Ok(*self.bbox_cache.get_or_init(|| extent))
    }
}

fn merge_rects(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
        geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
    )
}

fn pick_nearest(candidates: Vec<Intersection>, lat: f64, lng: f64) -> Option<Intersection> {
    let here = Point::new(lng, lat);
    candidates.into_iter().min_by(|a, b| {
        geo_ops::distance_meters(here, a.point()).total_cmp(&geo_ops::distance_meters(here, b.point()))
    })
}

fn intersection_from_row(row: &Row<'_>) -> rusqlite::Result<Intersection> {
    Ok(Intersection {
        id: row.get(0)?,
        osm_node_id: row.get(1)?,
        name: row.get(2)?,
        lat: row.get(3)?,
        lng: row.get(4)?,
        borough: row.get(5)?,
        sample_group: row.get(6)?,
    })
}

fn transit_stop_from_row(row: &Row<'_>) -> rusqlite::Result<TransitStop> {
    Ok(TransitStop {
        id: row.get(0)?,
        gtfs_stop_id: row.get(1)?,
        stop_name: row.get(2)?,
        lat: row.get(3)?,
        lng: row.get(4)?,
        stop_type: row.get(5)?,
        agency: row.get(6)?,
    })
}
