use indexmap::IndexMap;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::trace;

use crate::core::{Chat, FieldSpec, Message, ParseError, SignatureSchema};
use crate::data::Demonstration;

static FIELD_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[ ## (\w+) ## \]\]").expect("field header pattern is valid")
});

const COMPLETED: &str = "[[ ## completed ## ]]";

#[derive(Default, Clone, Copy, Debug)]
pub struct ChatAdapter;

/// Renders one field value for the prompt.
///
/// Lists (retrieved passages) become numbered `«...»` lines; strings are
/// inserted verbatim; anything else is compact JSON.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(idx, item)| {
                let text = match item {
                    Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                format!("[{}] «{}»", idx + 1, text)
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl ChatAdapter {
    fn field_attribute_list(&self, fields: &[FieldSpec]) -> String {
        let mut field_attributes = String::new();
        for (i, field) in fields.iter().enumerate() {
            field_attributes.push_str(&format!("{}. `{}` (str)", i + 1, field.name));
            if !field.desc.is_empty() {
                field_attributes.push_str(&format!(": {}", field.desc));
            }
            field_attributes.push('\n');
        }
        field_attributes
    }

    fn field_structure(&self, fields: &[FieldSpec]) -> String {
        fields
            .iter()
            .map(|field| format!("[[ ## {0} ## ]]\n{{{0}}}\n\n", field.name))
            .collect()
    }

    fn render_fields<'a>(
        &self,
        names: impl Iterator<Item = &'a str>,
        values: &IndexMap<String, Value>,
    ) -> String {
        let mut rendered = String::new();
        for name in names {
            if let Some(value) = values.get(name) {
                rendered.push_str(&format!("[[ ## {name} ## ]]\n{}\n\n", format_value(value)));
            }
        }
        rendered
    }

    pub fn format_field_description(&self, schema: &SignatureSchema) -> String {
        format!(
            "Your input fields are:\n{}Your output fields are:\n{}",
            self.field_attribute_list(&schema.input_fields),
            self.field_attribute_list(&schema.output_fields)
        )
    }

    pub fn format_field_structure(&self, schema: &SignatureSchema) -> String {
        format!(
            "All interactions will be structured in the following way, with the appropriate values filled in.\n\n{}{}{COMPLETED}\n",
            self.field_structure(&schema.input_fields),
            self.field_structure(&schema.output_fields)
        )
    }

    pub fn format_task_description(&self, schema: &SignatureSchema) -> String {
        let instruction = if schema.instruction.is_empty() {
            format!(
                "Given the fields {}, produce the fields {}.",
                schema
                    .input_names()
                    .map(|name| format!("`{name}`"))
                    .collect::<Vec<_>>()
                    .join(", "),
                schema
                    .output_names()
                    .map(|name| format!("`{name}`"))
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        } else {
            schema.instruction.clone()
        };

        format!("In adhering to this structure, your objective is: \n\t{instruction}")
    }

    pub fn format_system_message(&self, schema: &SignatureSchema) -> String {
        format!(
            "{}\n{}\n{}",
            self.format_field_description(schema),
            self.format_field_structure(schema),
            self.format_task_description(schema)
        )
    }

    pub fn format_user_message(
        &self,
        schema: &SignatureSchema,
        inputs: &IndexMap<String, Value>,
    ) -> String {
        let input_str = self.render_fields(schema.input_names(), inputs);

        let mut outputs = schema.output_names();
        let mut user_message = String::from("Respond with the corresponding output fields");
        if let Some(first) = outputs.next() {
            user_message.push_str(&format!(", starting with the field `[[ ## {first} ## ]]`"));
            for name in outputs {
                user_message.push_str(&format!(", then `[[ ## {name} ## ]]`"));
            }
        }
        user_message.push_str(&format!(", and then ending with the marker for `{COMPLETED}`."));

        format!("{input_str}{user_message}")
    }

    /// Assistant turn for a demonstration: its output fields, then the completion marker.
    pub fn format_assistant_message(
        &self,
        schema: &SignatureSchema,
        outputs: &IndexMap<String, Value>,
    ) -> String {
        format!("{}{COMPLETED}", self.render_fields(schema.output_names(), outputs))
    }

    /// Builds the full chat: system instructions, one user/assistant pair per
    /// demonstration, then the live inputs.
    pub fn format(
        &self,
        schema: &SignatureSchema,
        demos: &[Demonstration],
        inputs: &IndexMap<String, Value>,
    ) -> Chat {
        let mut chat = Chat::new(vec![Message::system(self.format_system_message(schema))]);

        for demo in demos {
            chat.push_message(Message::user(
                self.render_fields(schema.input_names(), &demo.fields)
                    .trim_end()
                    .to_string(),
            ));
            chat.push_message(Message::assistant(
                self.format_assistant_message(schema, &demo.fields),
            ));
        }

        chat.push_message(Message::user(self.format_user_message(schema, inputs)));
        trace!(messages = chat.len(), demos = demos.len(), "prompt formatted");
        chat
    }

    /// Extracts every output field from the text following its marker.
    pub fn parse_response(
        &self,
        schema: &SignatureSchema,
        response: &str,
    ) -> Result<IndexMap<String, Value>, ParseError> {
        let mut sections: IndexMap<String, String> = IndexMap::new();
        let headers: Vec<_> = FIELD_HEADER.captures_iter(response).collect();

        for (idx, captures) in headers.iter().enumerate() {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let end = headers
                .get(idx + 1)
                .and_then(|next| next.get(0))
                .map(|next| next.start())
                .unwrap_or(response.len());
            sections
                .entry(name.as_str().to_string())
                .or_insert_with(|| response[whole.end()..end].trim().to_string());
        }

        let mut output = IndexMap::new();
        for name in schema.output_names() {
            let Some(text) = sections.shift_remove(name) else {
                return Err(ParseError::MissingField {
                    field: name.to_string(),
                });
            };
            if text.is_empty() {
                return Err(ParseError::EmptyField {
                    field: name.to_string(),
                });
            }
            output.insert(name.to_string(), Value::String(text));
        }
        Ok(output)
    }
}
