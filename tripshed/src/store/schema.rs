//! cache store DDL. geometry columns hold WKB; timestamps are stored as
//! UTC text and compare lexicographically.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS intersections (
    id            INTEGER PRIMARY KEY,
    osm_node_id   INTEGER NOT NULL,
    name          TEXT NOT NULL DEFAULT '',
    lat           REAL NOT NULL,
    lng           REAL NOT NULL,
    borough       TEXT NOT NULL,
    sample_group  INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_intersections_lat_lng ON intersections (lat, lng);
CREATE INDEX IF NOT EXISTS idx_intersections_borough ON intersections (borough);

CREATE TABLE IF NOT EXISTS isochrone_bands (
    origin_id           INTEGER NOT NULL,
    mode                TEXT NOT NULL,
    departure_time      TEXT NOT NULL,
    day_type            TEXT NOT NULL,
    cutoff_minutes      INTEGER NOT NULL,
    geometry            BLOB NOT NULL,
    geometry_unclipped  BLOB NOT NULL,
    computed_at         TEXT NOT NULL,
    PRIMARY KEY (origin_id, mode, departure_time, day_type, cutoff_minutes)
);
CREATE INDEX IF NOT EXISTS idx_bands_key
    ON isochrone_bands (mode, departure_time, day_type, cutoff_minutes);

CREATE TABLE IF NOT EXISTS batch_status (
    intersection_id  INTEGER NOT NULL,
    mode             TEXT NOT NULL,
    departure_time   TEXT NOT NULL,
    day_type         TEXT NOT NULL,
    status           TEXT NOT NULL,
    started_at       TEXT,
    completed_at     TEXT,
    error_message    TEXT,
    UNIQUE (intersection_id, mode, departure_time, day_type)
);

CREATE TABLE IF NOT EXISTS land_boundary (
    geometry  BLOB NOT NULL
);

CREATE TABLE IF NOT EXISTS transit_stops (
    id            INTEGER PRIMARY KEY,
    gtfs_stop_id  TEXT NOT NULL,
    stop_name     TEXT NOT NULL,
    lat           REAL NOT NULL,
    lng           REAL NOT NULL,
    stop_type     TEXT NOT NULL,
    agency        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_transit_stops_lat_lng ON transit_stops (lat, lng);
"#;
