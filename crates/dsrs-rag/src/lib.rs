pub mod adapter;
pub mod core;
pub mod data;
pub mod evaluate;
pub mod modules;
pub mod optimizer;
pub mod predictors;
pub mod retrieve;
pub mod trace;
pub mod utils;

pub use adapter::{ChatAdapter, format_value};
pub use core::*;
pub use data::*;
pub use evaluate::*;
pub use modules::*;
pub use optimizer::*;
pub use predictors::*;
pub use retrieve::*;
pub use trace::*;
pub use utils::*;

#[macro_export]
macro_rules! example {
    // Pattern: { "key": "input" | "output" => value, ... }
    { $($key:literal : $field_type:literal => $value:expr),* $(,)? } => {{
        use $crate::data::example::Example;

        let mut input_keys = vec![];
        let mut output_keys = vec![];

        let mut fields = $crate::__private::IndexMap::new();
        $(
            if $field_type == "input" {
                input_keys.push($key.to_string());
            } else {
                output_keys.push($key.to_string());
            }

            fields.insert($key.to_string(), $crate::__private::serde_json::json!($value));
        )*

        Example::new(
            fields,
            input_keys,
            output_keys,
        )
    }};
}

#[doc(hidden)]
pub mod __private {
    pub use indexmap::IndexMap;
    pub use serde_json;
}
