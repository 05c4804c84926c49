//! The query object model.
//!
//! A query is a tree: the root [`QueryObject`] names an entity type, and
//! every [`QJoin`] hangs another query object off one of its reference or
//! to-many properties. Conditions refer to properties of any query object
//! in the tree through [`QProperty`] handles and may embed correlated
//! sub-queries.
//!
//! ```
//! use rowgraph_core::query::QueryObject;
//!
//! let mut author = QueryObject::new("Author");
//! let mut books = QueryObject::new("Book");
//! let title = books.prop("title");
//! books.select(["title"]);
//! author.left_outer_join("books", books);
//! author.filter(title.like("R%"));
//! assert_eq!(author.joins().len(), 1);
//! ```

mod condition;
mod object;

pub use condition::{Condition, LogicalOp, Operator, QProperty};
pub use object::{Correlation, JoinType, OrderBy, QJoin, QueryObject, QueryObjectId};
