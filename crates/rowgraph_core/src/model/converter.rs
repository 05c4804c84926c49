//! Custom value converters.

use crate::error::CoreResult;
use crate::model::SemanticType;
use crate::types::Value;

/// Converts between the value an entity exposes and the value stored in
/// the database.
///
/// "Forwards" is the direction database to entity. A node with a converter
/// is read as [`TypeConverter::backwards_type`] and then converted forwards;
/// it is converted backwards before being written.
pub trait TypeConverter: Send + Sync {
    /// The semantic type the entity sees.
    fn forwards_type(&self) -> SemanticType;

    /// The semantic type stored in the column.
    fn backwards_type(&self) -> SemanticType;

    /// Converts a stored value to the entity's value.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if the value cannot be represented.
    fn convert_forwards(&self, value: Value) -> CoreResult<Value>;

    /// Converts an entity value to the stored value.
    ///
    /// # Errors
    ///
    /// Returns a conversion error if the value cannot be represented.
    fn convert_backwards(&self, value: Value) -> CoreResult<Value>;
}
