//! pgvector statements for a `frames` table.
//!
//! For [`FrameStore`](super::FrameStore) implementations backed by Postgres:
//! the implementer owns the connection and executes these [`Statement`]s
//! with its driver, binding `params` in order.
//!
//! Every user-supplied value is a bind parameter (`$n`); only column names,
//! operators and the vector dimension appear in the SQL text. Colors are
//! matched through `packed_colors`, an `int[]` of `r << 16 | g << 8 | b`,
//! because `&&` on the 2-d `colors` array compares flattened channel values.

use crate::core::index::{FrameRecord, Rgb};
use crate::core::query::{CompiledQuery, ObjectsContain, VectorClause};

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Float(f64),
    TextArray(Vec<String>),
    IntArray(Vec<i32>),
    /// `int[][]`, one row per color
    ColorArray(Vec<Rgb>),
    Vector(Vec<f32>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Default)]
struct Binder {
    params: Vec<SqlValue>,
}

impl Binder {
    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }
}

const COLUMNS: &str = "id, video_id, frame_id, timestamp, colors, objects, text";

pub fn pack_color(color: Rgb) -> i32 {
    (color[0] as i32) << 16 | (color[1] as i32) << 8 | color[2] as i32
}

pub fn create_table_statement(dimension: usize) -> String {
    format!(
        "CREATE EXTENSION IF NOT EXISTS vector;
CREATE TABLE IF NOT EXISTS frames (
    id text PRIMARY KEY,
    video_id text,
    frame_id text,
    timestamp float,
    objects text[],
    colors int[][],
    packed_colors int[],
    image_vector vector({}),
    text text[]
);
CREATE INDEX IF NOT EXISTS frames_video_id ON frames (video_id);",
        dimension
    )
}

/// Objects are written sorted so `only` can compare with `=`.
pub fn insert_statement(record: &FrameRecord) -> Statement {
    let mut b = Binder::default();
    let values = [
        b.bind(SqlValue::Text(record.id.clone())),
        b.bind(SqlValue::Text(record.video_id.clone())),
        b.bind(SqlValue::Text(record.frame_id.clone())),
        b.bind(SqlValue::Float(record.timestamp)),
        b.bind(SqlValue::TextArray(record.object_labels())),
        b.bind(SqlValue::ColorArray(record.dominant_colors.clone())),
        b.bind(SqlValue::IntArray(
            record.dominant_colors.iter().map(|c| pack_color(*c)).collect(),
        )),
        format!("{}::vector", b.bind(SqlValue::Vector(record.embedding.clone()))),
        b.bind(SqlValue::TextArray(record.words.clone())),
    ];
    let sql = format!(
        "INSERT INTO frames (id, video_id, frame_id, timestamp, objects, colors, packed_colors, image_vector, text) VALUES ({})",
        values.join(", ")
    );
    b.finish(sql)
}

pub fn delete_statement(video_id: &str) -> Statement {
    let mut b = Binder::default();
    let sql = format!(
        "DELETE FROM frames WHERE video_id = {}",
        b.bind(SqlValue::Text(video_id.to_string()))
    );
    b.finish(sql)
}

/// `delete_statement` then one insert per record. Run them in a single
/// transaction to get the all-or-nothing semantics of `replace_video`.
pub fn replace_video_statements(video_id: &str, records: &[FrameRecord]) -> Vec<Statement> {
    std::iter::once(delete_statement(video_id))
        .chain(records.iter().map(insert_statement))
        .collect()
}

pub fn explore_statement(video_id: &str) -> Statement {
    let mut b = Binder::default();
    let sql = format!(
        "SELECT {} FROM frames WHERE video_id = {} ORDER BY timestamp ASC",
        COLUMNS,
        b.bind(SqlValue::Text(video_id.to_string()))
    );
    b.finish(sql)
}

/// Selects the record columns plus `text_distance` and `image_distance`
/// (NULL for an absent modality), ordered by their sum.
pub fn search_statement(query: &CompiledQuery) -> Statement {
    let mut b = Binder::default();
    let mut distances = Vec::new();
    let mut fired = Vec::new();

    let mut distance_column = |b: &mut Binder, clause: &Option<VectorClause>| {
        match clause {
            Some(c) => {
                let vector = b.bind(SqlValue::Vector(c.vector.clone()));
                let expr = format!("(image_vector <=> {}::vector)", vector);
                fired.push(format!("{} < {}", expr, b.bind(SqlValue::Float(c.ceiling))));
                distances.push(expr.clone());
                expr
            }
            None => "NULL::float8".to_string(),
        }
    };
    let text_col = distance_column(&mut b, &query.text);
    let image_col = distance_column(&mut b, &query.image);

    let mut conditions = Vec::new();
    if !fired.is_empty() {
        conditions.push(format!("({})", fired.join(" OR ")));
    }

    if let Some(objects) = &query.objects {
        let op = match objects.mode {
            ObjectsContain::Any => "&&",
            ObjectsContain::All => "@>",
            ObjectsContain::Only => "=",
        };
        conditions.push(format!(
            "objects {} {}::text[]",
            op,
            b.bind(SqlValue::TextArray(objects.labels.clone()))
        ));
    }

    if let Some(color) = &query.color {
        let packed = color.neighbourhood().into_iter().map(pack_color).collect();
        conditions.push(format!(
            "packed_colors && {}::int[]",
            b.bind(SqlValue::IntArray(packed))
        ));
    }

    if let Some(words) = &query.words {
        conditions.push(format!(
            "text && {}::text[]",
            b.bind(SqlValue::TextArray(words.clone()))
        ));
    }

    let mut sql = format!(
        "SELECT {}, {} AS text_distance, {} AS image_distance FROM frames",
        COLUMNS, text_col, image_col
    );
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    if !distances.is_empty() {
        sql.push_str(&format!(" ORDER BY {} ASC", distances.join(" + ")));
    }
    b.finish(sql)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::index::ChannelHistograms;
    use crate::core::query::{ColorPredicate, ObjectPredicate};
    use std::collections::BTreeMap;

    fn injected() -> String {
        "car'] ; DROP TABLE frames; --".to_string()
    }

    #[test]
    fn test_pack_color() {
        assert_eq!(pack_color([0, 0, 0]), 0);
        assert_eq!(pack_color([1, 2, 3]), 0x010203);
        assert_eq!(pack_color([255, 255, 255]), 0xFFFFFF);
    }

    #[test]
    fn test_match_all_has_no_where() {
        let st = search_statement(&CompiledQuery::match_all(10));
        assert_eq!(
            st.sql,
            "SELECT id, video_id, frame_id, timestamp, colors, objects, text, NULL::float8 AS text_distance, NULL::float8 AS image_distance FROM frames"
        );
        assert!(st.params.is_empty());
    }

    #[test]
    fn test_full_query_binds_every_value() {
        let mut query = CompiledQuery::match_all(10);
        query.text = Some(VectorClause {
            vector: vec![0.1, 0.2],
            ceiling: 0.875,
        });
        query.image = Some(VectorClause {
            vector: vec![0.3, 0.4],
            ceiling: 0.9,
        });
        query.objects = Some(ObjectPredicate::new(&[injected()], ObjectsContain::Only));
        query.color = Some(ColorPredicate::new([5, 5, 5], 1));
        query.words = Some(vec![injected()]);

        let st = search_statement(&query);
        assert!(!st.sql.contains("DROP"));
        assert!(!st.sql.contains("0.875"));
        assert!(st.sql.contains("((image_vector <=> $1::vector) < $2 OR (image_vector <=> $3::vector) < $4)"));
        assert!(st.sql.contains("objects = $5::text[]"));
        assert!(st.sql.contains("packed_colors && $6::int[]"));
        assert!(st.sql.contains("text && $7::text[]"));
        assert!(st.sql.ends_with("ORDER BY (image_vector <=> $1::vector) + (image_vector <=> $3::vector) ASC"));

        assert_eq!(st.params.len(), 7);
        assert_eq!(st.params[1], SqlValue::Float(0.875));
        assert_eq!(st.params[4], SqlValue::TextArray(vec![injected()]));
        match &st.params[5] {
            SqlValue::IntArray(colors) => {
                assert_eq!(colors.len(), 27);
                assert!(colors.contains(&pack_color([4, 6, 5])));
            }
            other => panic!("unexpected param {:?}", other),
        }
    }

    #[test]
    fn test_object_operators() {
        let labels = vec!["car".to_string()];
        for (mode, op) in [
            (ObjectsContain::Any, "objects && $1"),
            (ObjectsContain::All, "objects @> $1"),
            (ObjectsContain::Only, "objects = $1"),
        ] {
            let mut query = CompiledQuery::match_all(10);
            query.objects = Some(ObjectPredicate::new(&labels, mode));
            assert!(search_statement(&query).sql.contains(op));
        }
    }

    #[test]
    fn test_insert_and_lifecycle_statements() {
        let record = FrameRecord {
            id: "v-frame_1".into(),
            video_id: "v".into(),
            frame_id: "frame_1".into(),
            timestamp: 4.5,
            embedding: vec![0.5],
            objects: BTreeMap::from([("person".to_string(), 2), ("car".to_string(), 1)]),
            words: vec!["exit".into()],
            dominant_colors: vec![[1, 2, 3]],
            histogram: ChannelHistograms::empty(),
        };

        let st = insert_statement(&record);
        assert!(st.sql.ends_with("VALUES ($1, $2, $3, $4, $5, $6, $7, $8::vector, $9)"));
        assert_eq!(st.params[4], SqlValue::TextArray(vec!["car".into(), "person".into()]));
        assert_eq!(st.params[6], SqlValue::IntArray(vec![0x010203]));

        let st = delete_statement("v'; --");
        assert_eq!(st.sql, "DELETE FROM frames WHERE video_id = $1");
        assert_eq!(st.params, vec![SqlValue::Text("v'; --".into())]);

        let batch = replace_video_statements("v", &[record.clone()]);
        assert_eq!(batch.len(), 2);
        assert!(batch[0].sql.starts_with("DELETE"));
        assert_eq!(batch[1], insert_statement(&record));
        assert_eq!(replace_video_statements("v", &[]).len(), 1);

        let st = explore_statement("v");
        assert!(st.sql.ends_with("WHERE video_id = $1 ORDER BY timestamp ASC"));

        assert!(create_table_statement(768).contains("vector(768)"));
    }
}
