//! SQLite-backed stores.
//!
//! All statements run on the `tokio-rusqlite` connection thread, so callers
//! never block the async runtime on disk I/O.

use crate::store::{pair_key, FaceDistanceStore, FaceStore, PredictionStore, StoreError};
use likeness_core::{Descriptors, Detection, FaceItem, Landmarks, Prediction, PredictionItem, Rect};
use rusqlite::{params, OptionalExtension};
use std::path::Path;

const SCHEMA: &str = "
create table if not exists predictions (
    id      text not null,
    network text not null,
    label   text not null,
    score   real not null,
    created timestamp default CURRENT_TIMESTAMP,
    primary key (id, network, label)
);

create table if not exists faces (
    seq         integer primary key autoincrement,
    id          text not null,
    network     text not null,
    box_min_x   integer not null,
    box_min_y   integer not null,
    box_max_x   integer not null,
    box_max_y   integer not null,
    score       real not null,
    class       real not null,
    landmarks   text not null,
    descriptors text not null,
    created     timestamp default CURRENT_TIMESTAMP
);

create index if not exists faces_by_id on faces (id);

create table if not exists face_distances (
    id1      text not null,
    id2      text not null,
    distance real not null,
    created  timestamp default CURRENT_TIMESTAMP,
    primary key (id1, id2)
);
";

const FACE_COLUMNS: &str =
    "id, network, box_min_x, box_min_y, box_max_x, box_max_y, score, class, landmarks, descriptors";

/// A `faces` row before its JSON columns are decoded.
struct FaceRow {
    identifier: String,
    network: String,
    detection: Detection,
    landmarks: String,
    descriptors: String,
}

impl FaceRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            identifier: row.get(0)?,
            network: row.get(1)?,
            detection: Detection {
                bbox: Rect::new(row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?),
                score: row.get(6)?,
                class: row.get(7)?,
            },
            landmarks: row.get(8)?,
            descriptors: row.get(9)?,
        })
    }

    fn decode(self) -> Result<FaceItem, StoreError> {
        Ok(FaceItem {
            identifier: self.identifier,
            network: self.network,
            detection: self.detection,
            landmarks: serde_json::from_str::<Landmarks>(&self.landmarks)?,
            descriptors: serde_json::from_str::<Descriptors>(&self.descriptors)?,
        })
    }
}

/// A face with its JSON columns encoded, ready to insert under `id`.
struct EncodedFace {
    id: String,
    network: String,
    detection: Detection,
    landmarks: String,
    descriptors: String,
}

impl EncodedFace {
    fn new(id: &str, item: &FaceItem) -> Result<Self, StoreError> {
        Ok(Self {
            id: id.to_owned(),
            network: item.network.clone(),
            detection: item.detection.clone(),
            landmarks: serde_json::to_string(&item.landmarks)?,
            descriptors: serde_json::to_string(&item.descriptors)?,
        })
    }

    fn insert(&self, conn: &rusqlite::Connection) -> rusqlite::Result<()> {
        let det = &self.detection;
        conn.execute(
            "insert into faces (
                 id, network, box_min_x, box_min_y, box_max_x, box_max_y,
                 score, class, landmarks, descriptors
             ) values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                self.id,
                self.network,
                det.bbox.min_x,
                det.bbox.min_y,
                det.bbox.max_x,
                det.bbox.max_y,
                det.score,
                det.class,
                self.landmarks,
                self.descriptors,
            ],
        )?;
        Ok(())
    }
}

/// Prediction, face and face-distance store on a single SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio_rusqlite::Connection::open(&path).await?;
        tracing::info!(path = %path.display(), "opened sqlite store");
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: tokio_rusqlite::Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

impl PredictionStore for SqliteStore {
    async fn get_prediction(&self, id: &str) -> Result<Option<PredictionItem>, StoreError> {
        let id = id.to_owned();
        let lookup = id.clone();
        let predictions = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "select network, label, score
                     from predictions
                     where id = ?1
                     order by score desc",
                )?;
                let rows = stmt.query_map([&lookup], |row| {
                    Ok(Prediction {
                        network: row.get(0)?,
                        label: row.get(1)?,
                        score: row.get(2)?,
                    })
                })?;
                let predictions = rows.collect::<Result<Vec<_>, _>>()?;
                Ok(predictions)
            })
            .await?;

        if predictions.is_empty() {
            return Ok(None);
        }

        Ok(Some(PredictionItem { identifier: id, predictions }))
    }

    async fn store_prediction(&self, id: &str, item: &PredictionItem) -> Result<(), StoreError> {
        let id = id.to_owned();
        let predictions = item.predictions.clone();
        let count = predictions.len();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "insert into predictions (id, network, label, score)
                         values (?1, ?2, ?3, ?4)",
                    )?;
                    for p in &predictions {
                        stmt.execute(params![id, p.network, p.label, p.score])?;
                    }
                }
                tx.commit()?;
                Ok(())
            })
            .await?;

        tracing::debug!(count, "stored predictions");
        Ok(())
    }

    async fn search_prediction(
        &self,
        query: &str,
        after: Option<&str>,
        n: usize,
    ) -> Result<Vec<PredictionItem>, StoreError> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let query = query.to_owned();
        let after = after.filter(|a| !a.is_empty()).map(str::to_owned);
        let limit = i64::try_from(n).unwrap_or(i64::MAX);

        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "select id, network, label, score
                     from predictions
                     where id in (
                         select distinct id from predictions
                         where (?1 = '' or instr(label, ?1) > 0)
                           and (?2 is null or id > ?2)
                         order by id
                         limit ?3
                     )
                     order by id asc, score desc",
                )?;
                let rows = stmt.query_map(params![query, after, limit], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        Prediction {
                            network: row.get(1)?,
                            label: row.get(2)?,
                            score: row.get(3)?,
                        },
                    ))
                })?;
                let rows = rows.collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut items: Vec<PredictionItem> = Vec::new();
        for (id, prediction) in rows {
            match items.last_mut() {
                Some(item) if item.identifier == id => item.predictions.push(prediction),
                _ => items.push(PredictionItem {
                    identifier: id,
                    predictions: vec![prediction],
                }),
            }
        }

        Ok(items)
    }
}

impl FaceStore for SqliteStore {
    async fn store_face(&self, item: &FaceItem) -> Result<(), StoreError> {
        let face = EncodedFace::new(&item.identifier, item)?;
        self.conn
            .call(move |conn| {
                face.insert(conn)?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn store_faces(&self, id: &str, items: &[FaceItem]) -> Result<(), StoreError> {
        let id = id.to_owned();
        let faces = items
            .iter()
            .map(|item| EncodedFace::new(&id, item))
            .collect::<Result<Vec<_>, _>>()?;
        let count = faces.len();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("delete from faces where id = ?1", [&id])?;
                for face in &faces {
                    face.insert(&tx)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;

        tracing::debug!(count, "stored faces");
        Ok(())
    }

    async fn get_faces(&self, id: &str) -> Result<Vec<FaceItem>, StoreError> {
        let id = id.to_owned();
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt =
                    conn.prepare(&format!("select {FACE_COLUMNS} from faces where id = ?1 order by seq"))?;
                let rows = stmt.query_map([&id], FaceRow::from_row)?;
                let rows = rows.collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(FaceRow::decode).collect()
    }

    async fn get_all_faces(&self) -> Result<Vec<FaceItem>, StoreError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!("select {FACE_COLUMNS} from faces order by seq"))?;
                let rows = stmt.query_map([], FaceRow::from_row)?;
                let rows = rows.collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(FaceRow::decode).collect()
    }
}

impl FaceDistanceStore for SqliteStore {
    async fn store_face_distance(&self, a: &FaceItem, b: &FaceItem, distance: f32) -> Result<(), StoreError> {
        let (id1, id2) = pair_key(&a.identifier, &b.identifier);
        let (id1, id2) = (id1.to_owned(), id2.to_owned());

        self.conn
            .call(move |conn| {
                conn.execute(
                    "insert into face_distances (id1, id2, distance)
                     values (?1, ?2, ?3)
                     on conflict (id1, id2) do update set distance = excluded.distance",
                    params![id1, id2, distance],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn get_face_distance(&self, a: &FaceItem, b: &FaceItem) -> Result<Option<f32>, StoreError> {
        let (id1, id2) = pair_key(&a.identifier, &b.identifier);
        let (id1, id2) = (id1.to_owned(), id2.to_owned());

        let distance = self
            .conn
            .call(move |conn| {
                let distance = conn
                    .query_row(
                        "select distance from face_distances where id1 = ?1 and id2 = ?2",
                        params![id1, id2],
                        |row| row.get::<_, f32>(0),
                    )
                    .optional()?;
                Ok(distance)
            })
            .await?;
        Ok(distance)
    }
}
