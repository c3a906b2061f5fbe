pub mod builder;
pub mod engine;
pub mod error;
pub mod model;
pub mod ranker;
pub mod vocabulary;

pub use builder::{
    neighbour_colors, ColorPredicate, CompiledQuery, ObjectPredicate, QueryBuilder, VectorClause,
};
pub use engine::run_query;
pub use error::QueryError;
pub use model::{ColorQuery, ObjectsContain, Query, RankingParams};
pub use ranker::{color_refinement, explore_items, rank, ResultItem};
