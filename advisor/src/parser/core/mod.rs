//! Core parsing components for plan documents.

pub mod missing_index_parser;
pub mod operator_parser;
pub mod runtime_parser;
pub mod statement_parser;
pub mod value_parser;

pub use missing_index_parser::MissingIndexParser;
pub use operator_parser::OperatorParser;
pub use runtime_parser::RuntimeParser;
pub use statement_parser::StatementParser;
pub use value_parser::ValueParser;

use roxmltree::Node;

/// True when `node` is the namespace-qualified element `name`.
pub(crate) fn is_element(node: Node<'_, '_>, ns: &str, name: &str) -> bool {
    node.is_element() && node.tag_name().name() == name && node.tag_name().namespace() == Some(ns)
}
