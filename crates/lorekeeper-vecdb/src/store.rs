//! # Multi-vector store
//!
//! An embedded, file-backed collection store for multi-vector points,
//! scored with MaxSim. Everything lives in one SQLite file inside the
//! store directory.
//!
//! A collection can carry an int8 scalar-quantized index. It is built when
//! the indexing threshold is raised above zero, typically after a bulk
//! upload; from then on new points are quantized as they are inserted and
//! queries rank on the quantized rows before rescoring the best candidates
//! on the original vectors.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{Result, VecDbError};
use crate::quantize::{AbsHistogram, ScalarQuantizer};
use crate::scoring::{MultiVector, max_sim, normalize};

/// File name of the SQLite database inside the store directory.
pub const STORE_FILE: &str = "collections.sqlite3";

/// Candidates per requested result rescored on the original vectors.
pub const RESCORE_OVERSAMPLING: usize = 4;

/// Similarity between single vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Distance {
    /// Rows are normalized on insert and query, then compared by dot product.
    Cosine,
    Dot,
}

/// How the rows of two multi-vectors are combined into one score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiVectorComparator {
    MaxSim,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalarType {
    Int8,
}

/// Scalar quantization settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarQuantization {
    pub kind: ScalarType,
    /// Quantile of absolute component values used as the clipping bound.
    pub quantile: f32,
    /// Keep the quantized rows in memory between queries.
    pub always_ram: bool,
}

/// Settings of one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub vector_size: usize,
    pub distance: Distance,
    pub comparator: MultiVectorComparator,
    pub quantization: Option<ScalarQuantization>,
    pub on_disk_payload: bool,
    /// Zero disables the quantized index.
    pub indexing_threshold: u64,
}

impl CollectionConfig {
    /// Cosine MaxSim collection without quantization.
    pub fn new(vector_size: usize) -> Self {
        Self {
            vector_size,
            distance: Distance::Cosine,
            comparator: MultiVectorComparator::MaxSim,
            quantization: None,
            on_disk_payload: false,
            indexing_threshold: 0,
        }
    }

    pub fn with_distance(mut self, distance: Distance) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_int8_quantization(mut self, quantile: f32, always_ram: bool) -> Self {
        self.quantization = Some(ScalarQuantization {
            kind: ScalarType::Int8,
            quantile,
            always_ram,
        });
        self
    }

    pub fn with_on_disk_payload(mut self, on_disk: bool) -> Self {
        self.on_disk_payload = on_disk;
        self
    }

    pub fn with_indexing_threshold(mut self, threshold: u64) -> Self {
        self.indexing_threshold = threshold;
        self
    }
}

/// A point to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct PointStruct {
    pub id: u64,
    pub vectors: MultiVector,
    pub payload: Map<String, Value>,
}

impl PointStruct {
    pub fn new(id: u64, vectors: MultiVector) -> Self {
        Self {
            id,
            vectors,
            payload: Map::new(),
        }
    }

    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }
}

/// A query hit.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
    pub payload: Map<String, Value>,
}

struct QuantizedIndex {
    quantizer: ScalarQuantizer,
    points: Vec<(u64, Vec<Vec<i8>>)>,
}

fn encode_f32(rows: &[Vec<f32>]) -> Vec<u8> {
    rows.iter()
        .flat_map(|r| r.iter().flat_map(|f| f.to_le_bytes()))
        .collect()
}

fn decode_f32(bytes: &[u8], vector_size: usize) -> MultiVector {
    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    values.chunks(vector_size.max(1)).map(<[f32]>::to_vec).collect()
}

fn encode_i8(rows: &[Vec<i8>]) -> Vec<u8> {
    rows.iter().flat_map(|r| r.iter().map(|&v| v as u8)).collect()
}

fn decode_i8(bytes: &[u8], vector_size: usize) -> Vec<Vec<i8>> {
    bytes
        .chunks(vector_size.max(1))
        .map(|c| c.iter().map(|&b| b as i8).collect())
        .collect()
}

fn sql_id(id: u64) -> Result<i64> {
    i64::try_from(id).map_err(|_| VecDbError::InvalidPoint(format!("id {id} does not fit in i64")))
}

/// Sorts by score descending, then id ascending.
fn rank(scored: &mut [(u64, f32)]) {
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
}

/// File-backed store of multi-vector collections.
pub struct MultiVectorStore {
    conn: Connection,
    path: PathBuf,
    ram_indexes: HashMap<String, Arc<QuantizedIndex>>,
}

impl MultiVectorStore {
    /// Opens (creating if needed) the store in directory `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(STORE_FILE);
        let conn = Connection::open(&path)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                config TEXT NOT NULL,
                quantizer_bound REAL
            );

            CREATE TABLE IF NOT EXISTS points (
                collection TEXT NOT NULL,
                id INTEGER NOT NULL,
                vectors BLOB NOT NULL,
                quantized BLOB,
                payload TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            "#,
        )?;

        debug!(path = %path.display(), "Opened vector store");
        Ok(Self {
            conn,
            path,
            ram_indexes: HashMap::new(),
        })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn collection_exists(&self, name: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM collections WHERE name = ?1", params![name], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Removes a collection and its points. Returns whether it existed.
    pub fn delete_collection(&mut self, name: &str) -> Result<bool> {
        self.ram_indexes.remove(name);
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM points WHERE collection = ?1", params![name])?;
        let removed = tx.execute("DELETE FROM collections WHERE name = ?1", params![name])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn create_collection(&mut self, name: &str, config: CollectionConfig) -> Result<()> {
        if config.vector_size == 0 {
            return Err(VecDbError::InvalidPoint("vector size must be positive".into()));
        }
        if self.collection_exists(name)? {
            return Err(VecDbError::CollectionExists(name.to_string()));
        }
        self.conn.execute(
            "INSERT INTO collections (name, config, quantizer_bound) VALUES (?1, ?2, NULL)",
            params![name, serde_json::to_string(&config)?],
        )?;
        info!(collection = name, vector_size = config.vector_size, "Created collection");
        Ok(())
    }

    pub fn collection_config(&self, name: &str) -> Result<CollectionConfig> {
        let config: Option<String> = self
            .conn
            .query_row(
                "SELECT config FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        let config = config.ok_or_else(|| VecDbError::CollectionNotFound(name.to_string()))?;
        Ok(serde_json::from_str(&config)?)
    }

    /// Quantizer of the collection's index, if one has been built.
    pub fn quantizer(&self, name: &str) -> Result<Option<ScalarQuantizer>> {
        let bound: Option<Option<f64>> = self
            .conn
            .query_row(
                "SELECT quantizer_bound FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        match bound {
            None => Err(VecDbError::CollectionNotFound(name.to_string())),
            Some(bound) => Ok(bound.map(|b| ScalarQuantizer::new(b as f32))),
        }
    }

    pub fn count(&self, name: &str) -> Result<usize> {
        self.collection_config(name)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM points WHERE collection = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn prepare_rows(config: &CollectionConfig, rows: &[Vec<f32>]) -> Result<MultiVector> {
        if rows.is_empty() {
            return Err(VecDbError::InvalidPoint("no vectors".into()));
        }
        let mut prepared = rows.to_vec();
        for row in &mut prepared {
            if row.len() != config.vector_size {
                return Err(VecDbError::DimensionMismatch {
                    expected: config.vector_size,
                    actual: row.len(),
                });
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(VecDbError::InvalidPoint("non-finite component".into()));
            }
            if config.distance == Distance::Cosine {
                normalize(row);
            }
        }
        Ok(prepared)
    }

    /// Inserts or replaces points. Either every point is written or none.
    pub fn upsert(&mut self, name: &str, points: &[PointStruct]) -> Result<()> {
        let config = self.collection_config(name)?;
        let quantizer = self.quantizer(name)?;

        let mut rows = Vec::with_capacity(points.len());
        for point in points {
            let vectors = Self::prepare_rows(&config, &point.vectors)?;
            let quantized = quantizer.map(|q| encode_i8(&q.encode_rows(&vectors)));
            rows.push((
                sql_id(point.id)?,
                encode_f32(&vectors),
                quantized,
                serde_json::to_string(&point.payload)?,
            ));
        }

        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO points (collection, id, vectors, quantized, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (id, vectors, quantized, payload) in &rows {
                stmt.execute(params![name, id, vectors, quantized, payload])?;
            }
        }
        tx.commit()?;

        self.ram_indexes.remove(name);
        debug!(collection = name, points = points.len(), "Upserted points");
        Ok(())
    }

    /// Updates the indexing threshold. Above zero, the quantized index is
    /// (re)built over every stored row; zero drops it.
    pub fn update_indexing_threshold(&mut self, name: &str, threshold: u64) -> Result<()> {
        let mut config = self.collection_config(name)?;
        config.indexing_threshold = threshold;
        self.conn.execute(
            "UPDATE collections SET config = ?2 WHERE name = ?1",
            params![name, serde_json::to_string(&config)?],
        )?;
        self.ram_indexes.remove(name);

        match config.quantization {
            Some(quantization) if threshold > 0 => self.build_index(name, &config, quantization),
            _ => self.drop_index(name),
        }
    }

    fn drop_index(&mut self, name: &str) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE collections SET quantizer_bound = NULL WHERE name = ?1",
            params![name],
        )?;
        tx.execute(
            "UPDATE points SET quantized = NULL WHERE collection = ?1",
            params![name],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn for_each_row(
        &self,
        name: &str,
        vector_size: usize,
        mut visit: impl FnMut(u64, MultiVector),
    ) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, vectors FROM points WHERE collection = ?1")?;
        let mut rows = stmt.query(params![name])?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let blob: Vec<u8> = row.get(1)?;
            visit(id as u64, decode_f32(&blob, vector_size));
        }
        Ok(())
    }

    fn build_index(
        &mut self,
        name: &str,
        config: &CollectionConfig,
        quantization: ScalarQuantization,
    ) -> Result<()> {
        let mut max = 0.0f32;
        self.for_each_row(name, config.vector_size, |_, rows| {
            max = rows.iter().flatten().fold(max, |m, v| m.max(v.abs()));
        })?;

        let mut histogram = AbsHistogram::new(max);
        self.for_each_row(name, config.vector_size, |_, rows| {
            rows.iter().for_each(|r| histogram.add(r));
        })?;
        let quantizer = ScalarQuantizer::new(histogram.quantile(quantization.quantile));

        let mut encoded = Vec::new();
        self.for_each_row(name, config.vector_size, |id, rows| {
            encoded.push((id as i64, encode_i8(&quantizer.encode_rows(&rows))));
        })?;

        let tx = self.conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("UPDATE points SET quantized = ?3 WHERE collection = ?1 AND id = ?2")?;
            for (id, blob) in &encoded {
                stmt.execute(params![name, id, blob])?;
            }
        }
        tx.execute(
            "UPDATE collections SET quantizer_bound = ?2 WHERE name = ?1",
            params![name, quantizer.bound() as f64],
        )?;
        tx.commit()?;

        info!(
            collection = name,
            points = encoded.len(),
            bound = quantizer.bound(),
            "Built quantized index"
        );
        Ok(())
    }

    fn load_index(&self, name: &str, vector_size: usize, quantizer: ScalarQuantizer) -> Result<QuantizedIndex> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, vectors, quantized FROM points WHERE collection = ?1")?;
        let mut rows = stmt.query(params![name])?;

        let mut points = Vec::new();
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let quantized: Option<Vec<u8>> = row.get(2)?;
            let rows = match quantized {
                Some(blob) => decode_i8(&blob, vector_size),
                None => {
                    let blob: Vec<u8> = row.get(1)?;
                    quantizer.encode_rows(&decode_f32(&blob, vector_size))
                }
            };
            points.push((id as u64, rows));
        }
        Ok(QuantizedIndex { quantizer, points })
    }

    fn index(&mut self, name: &str, config: &CollectionConfig) -> Result<Option<Arc<QuantizedIndex>>> {
        if let Some(index) = self.ram_indexes.get(name) {
            return Ok(Some(Arc::clone(index)));
        }
        let Some(quantizer) = self.quantizer(name)? else {
            return Ok(None);
        };

        let index = Arc::new(self.load_index(name, config.vector_size, quantizer)?);
        if config.quantization.is_some_and(|q| q.always_ram) {
            self.ram_indexes.insert(name.to_string(), Arc::clone(&index));
        }
        Ok(Some(index))
    }

    fn vectors(&self, name: &str, id: u64, vector_size: usize) -> Result<Option<MultiVector>> {
        let blob: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT vectors FROM points WHERE collection = ?1 AND id = ?2",
                params![name, sql_id(id)?],
                |row| row.get(0),
            )
            .optional()?;
        Ok(blob.map(|b| decode_f32(&b, vector_size)))
    }

    fn payload(&self, name: &str, id: u64) -> Result<Map<String, Value>> {
        let text: String = self.conn.query_row(
            "SELECT payload FROM points WHERE collection = ?1 AND id = ?2",
            params![name, sql_id(id)?],
            |row| row.get(0),
        )?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Returns the `limit` points with the highest MaxSim score against
    /// `query`, best first; ties go to the lower id.
    pub fn query_points(&mut self, name: &str, query: &[Vec<f32>], limit: usize) -> Result<Vec<ScoredPoint>> {
        let config = self.collection_config(name)?;
        let query = Self::prepare_rows(&config, query)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut scored = match self.index(name, &config)? {
            Some(index) => {
                let encoded = index.quantizer.encode_rows(&query);
                let mut candidates: Vec<(u64, f32)> = index
                    .points
                    .iter()
                    .map(|(id, rows)| (*id, index.quantizer.max_sim_quantized(&encoded, rows)))
                    .collect();
                rank(&mut candidates);
                candidates.truncate(limit.saturating_mul(RESCORE_OVERSAMPLING));

                let mut rescored = Vec::with_capacity(candidates.len());
                for (id, _) in candidates {
                    if let Some(rows) = self.vectors(name, id, config.vector_size)? {
                        rescored.push((id, max_sim(&query, &rows)));
                    }
                }
                rescored
            }
            None => {
                let mut all = Vec::new();
                self.for_each_row(name, config.vector_size, |id, rows| {
                    all.push((id, max_sim(&query, &rows)));
                })?;
                all
            }
        };

        rank(&mut scored);
        scored.truncate(limit);
        scored
            .into_iter()
            .map(|(id, score)| -> Result<ScoredPoint> {
                Ok(ScoredPoint {
                    id,
                    score,
                    payload: self.payload(name, id)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: &str = "pages";

    fn store() -> (tempfile::TempDir, MultiVectorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = MultiVectorStore::open(&dir.path().join("qdrant")).unwrap();
        (dir, store)
    }

    fn axis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; 4];
        v[i] = 1.0;
        v
    }

    fn sample_points() -> Vec<PointStruct> {
        vec![
            PointStruct::new(0, vec![axis(0), axis(1)]).with_payload("source", "a.png"),
            PointStruct::new(1, vec![vec![2.0, 0.0, 2.0, 0.0]]).with_payload("source", "b.png"),
            PointStruct::new(2, vec![axis(2), axis(3)]).with_payload("source", "c.png"),
        ]
    }

    fn ids(hits: &[ScoredPoint]) -> Vec<u64> {
        hits.iter().map(|h| h.id).collect()
    }

    #[test]
    fn collection_lifecycle() {
        let (_dir, mut store) = store();
        assert!(!store.collection_exists(NAME).unwrap());

        store.create_collection(NAME, CollectionConfig::new(4)).unwrap();
        assert!(store.collection_exists(NAME).unwrap());
        assert!(matches!(
            store.create_collection(NAME, CollectionConfig::new(4)),
            Err(VecDbError::CollectionExists(_))
        ));

        store.upsert(NAME, &sample_points()).unwrap();
        assert_eq!(store.count(NAME).unwrap(), 3);

        assert!(store.delete_collection(NAME).unwrap());
        assert!(!store.delete_collection(NAME).unwrap());
        assert!(matches!(store.count(NAME), Err(VecDbError::CollectionNotFound(_))));
    }

    #[test]
    fn upsert_rejects_wrong_dimensions() {
        let (_dir, mut store) = store();
        store.create_collection(NAME, CollectionConfig::new(4)).unwrap();

        let bad = [PointStruct::new(0, vec![vec![1.0, 0.0]])];
        assert!(matches!(
            store.upsert(NAME, &bad),
            Err(VecDbError::DimensionMismatch { expected: 4, actual: 2 })
        ));
        assert!(matches!(
            store.upsert(NAME, &[PointStruct::new(0, vec![])]),
            Err(VecDbError::InvalidPoint(_))
        ));
        assert_eq!(store.count(NAME).unwrap(), 0);
    }

    #[test]
    fn cosine_query_ranks_by_max_sim() {
        let (_dir, mut store) = store();
        store.create_collection(NAME, CollectionConfig::new(4)).unwrap();
        store.upsert(NAME, &sample_points()).unwrap();

        let hits = store.query_points(NAME, &[axis(2)], 3).unwrap();
        assert_eq!(ids(&hits), vec![2, 1, 0]);
        assert!((hits[0].score - 1.0).abs() < 1e-6);
        // [2, 0, 2, 0] is stored normalized
        assert!((hits[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert_eq!(hits[0].payload["source"], "c.png");
    }

    #[test]
    fn ties_are_broken_by_id_and_limit_applies() {
        let (_dir, mut store) = store();
        store.create_collection(NAME, CollectionConfig::new(4)).unwrap();
        store
            .upsert(
                NAME,
                &[
                    PointStruct::new(7, vec![axis(0)]),
                    PointStruct::new(3, vec![axis(0)]),
                    PointStruct::new(5, vec![axis(1)]),
                ],
            )
            .unwrap();

        let hits = store.query_points(NAME, &[axis(0)], 2).unwrap();
        assert_eq!(ids(&hits), vec![3, 7]);
        assert!(store.query_points(NAME, &[axis(0)], 0).unwrap().is_empty());
    }

    #[test]
    fn dot_distance_keeps_magnitudes() {
        let (_dir, mut store) = store();
        let config = CollectionConfig::new(4).with_distance(Distance::Dot);
        store.create_collection(NAME, config).unwrap();
        store.upsert(NAME, &sample_points()).unwrap();

        let hits = store.query_points(NAME, &[axis(0)], 1).unwrap();
        assert_eq!(ids(&hits), vec![1]);
        assert!((hits[0].score - 2.0).abs() < 1e-6);
    }

    #[test]
    fn quantized_index_is_built_on_threshold_and_keeps_ranking() {
        let (_dir, mut store) = store();
        let config = CollectionConfig::new(4)
            .with_int8_quantization(0.99, true)
            .with_on_disk_payload(true);
        store.create_collection(NAME, config).unwrap();
        store.upsert(NAME, &sample_points()).unwrap();
        assert!(store.quantizer(NAME).unwrap().is_none());

        let before = store.query_points(NAME, &[axis(2), axis(0)], 3).unwrap();

        store.update_indexing_threshold(NAME, 10).unwrap();
        assert!(store.quantizer(NAME).unwrap().is_some());
        assert_eq!(store.collection_config(NAME).unwrap().indexing_threshold, 10);

        let after = store.query_points(NAME, &[axis(2), axis(0)], 3).unwrap();
        assert_eq!(ids(&after), ids(&before));
        for (a, b) in after.iter().zip(&before) {
            assert!((a.score - b.score).abs() < 1e-6);
        }

        // Points added after indexing are quantized on insert.
        store
            .upsert(NAME, &[PointStruct::new(9, vec![axis(3)]).with_payload("source", "d.png")])
            .unwrap();
        let hits = store.query_points(NAME, &[axis(3)], 1).unwrap();
        assert_eq!(ids(&hits), vec![2]);

        store.update_indexing_threshold(NAME, 0).unwrap();
        assert!(store.quantizer(NAME).unwrap().is_none());
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = MultiVectorStore::open(dir.path()).unwrap();
            store.create_collection(NAME, CollectionConfig::new(4)).unwrap();
            store.upsert(NAME, &sample_points()).unwrap();
        }
        let mut store = MultiVectorStore::open(dir.path()).unwrap();
        assert_eq!(store.count(NAME).unwrap(), 3);
        assert_eq!(ids(&store.query_points(NAME, &[axis(1)], 1).unwrap()), vec![0]);
    }
}
