pub mod hybrid;
pub mod lexical;
pub mod text_search;

pub use hybrid::{reciprocal_rank_fusion, HybridSource};
pub use lexical::{LexicalHit, LexicalIndex};
pub use text_search::TextSearch;
