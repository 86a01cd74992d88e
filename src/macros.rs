//! Accessor generation macros
//!
//! These macros eliminate repetitive match code on payload enums.
//! Identifier concatenation goes through `paste`.

// =============================================================================
// Payload accessor generation
// =============================================================================

/// Generate is_xxx, as_xxx, as_xxx_mut methods for a payload enum
///
/// # Generated methods per variant:
/// - `is_xxx(&self) -> bool` - variant check
/// - `as_xxx(&self) -> Option<&Payload>` - immutable accessor
/// - `as_xxx_mut(&mut self) -> Option<&mut Payload>` - mutable accessor
///
/// # Example
/// ```ignore
/// impl BlockData {
///     impl_data_accessors!(Callout => CalloutData, TableRow => TableRowData);
///     // is_callout(), as_table_row_mut(), ...
/// }
/// ```
macro_rules! impl_data_accessors {
    ($($variant:ident => $payload:ty),* $(,)?) => {
        ::paste::paste! {
            $(
                #[doc = "Check if this carries " $variant " data"]
                pub fn [<is_ $variant:snake>](&self) -> bool {
                    matches!(self, Self::$variant(_))
                }

                #[doc = "Get reference to " $variant " data"]
                pub fn [<as_ $variant:snake>](&self) -> Option<&$payload> {
                    match self { Self::$variant(v) => Some(v), _ => None }
                }

                #[doc = "Get mutable reference to " $variant " data"]
                pub fn [<as_ $variant:snake _mut>](&mut self) -> Option<&mut $payload> {
                    match self { Self::$variant(v) => Some(v), _ => None }
                }
            )*
        }
    };
}

/// Generate `is_xxx` predicates over groups of fieldless enum variants
///
/// # Example
/// ```ignore
/// impl BlockKind {
///     impl_kind_groups!(heading: Heading1 | Heading2 | Heading3);
///     // is_heading()
/// }
/// ```
macro_rules! impl_kind_groups {
    ($($group:ident: $($variant:ident)|+),* $(,)?) => {
        ::paste::paste! {
            $(
                #[doc = "Check if this kind belongs to the " $group " group"]
                pub fn [<is_ $group>](&self) -> bool {
                    matches!(self, $(Self::$variant)|+)
                }
            )*
        }
    };
}
