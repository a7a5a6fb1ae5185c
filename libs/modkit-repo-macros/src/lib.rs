//! # modkit-repo-macros
//!
//! Procedural macros for the `modkit-repo` record layer.
//!
//! ## `#[derive(Record)]`
//!
//! Implements `modkit_repo::Record` for the `SeaORM` entity generated next to
//! the annotated `Model`. Every hook is optional; a bare derive yields a record
//! without soft delete, timestamps or engine-defaulted columns.
//!
//! ```ignore
//! use modkit_repo::Record;
//! use sea_orm::entity::prelude::*;
//!
//! #[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize, DeriveEntityModel, Record)]
//! #[sea_orm(table_name = "articles")]
//! #[record(
//!     soft_delete_col = "deleted_at",
//!     created_at_col = "created_at",
//!     updated_at_col = "updated_at",
//!     engine_defaults("status")
//! )]
//! pub struct Model {
//!     #[sea_orm(primary_key)]
//!     pub id: i32,
//!     #[sea_orm(default_value = "draft")]
//!     pub status: String,
//!     pub created_at: Option<DateTimeUtc>,
//!     pub updated_at: Option<DateTimeUtc>,
//!     pub deleted_at: Option<DateTimeUtc>,
//! }
//! ```
//!
//! ### Attributes
//! - `soft_delete_col = "column"`: nullable timestamp marking logical deletion
//! - `created_at_col = "column"`, `updated_at_col = "column"`: stamped on write
//! - `engine_defaults("a", "b")`: columns left to the engine when input omits them

use proc_macro::TokenStream;
use proc_macro_error2::proc_macro_error;
use syn::{DeriveInput, parse_macro_input};

mod record;

/// Derive macro for implementing `Record`.
///
/// Place it on the `SeaORM` `Model` struct; column names in `#[record(...)]`
/// are snake case and resolve to the entity's `Column` variants.
#[proc_macro_derive(Record, attributes(record))]
#[proc_macro_error]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    record::expand_derive_record(input).into()
}
