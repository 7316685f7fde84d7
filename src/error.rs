use crate::{
    axis::AxisError,
    cif::CifError,
    graph::{ConfigError, GraphError},
    role::AnswerError,
    table::TableError,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Error in the `axis` module")]
    Axis(#[from] AxisError),
    #[error("Error in the `table` module")]
    Table(#[from] TableError),
    #[error("Error in the `cif` module")]
    Cif(#[from] CifError),
    #[error("Error in the creator answers")]
    Answer(#[from] AnswerError),
    #[error("Error in the graph builder configuration")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}
