use serde::{Deserialize, Deserializer, Serialize};

/// One inbox item as returned by the gateway's `--format full` search.
///
/// Every text field tolerates being absent or `null`; both read as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Email {
    #[serde(default, deserialize_with = "nullable")]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub subject: String,
    #[serde(default, rename = "from", alias = "sender", deserialize_with = "nullable")]
    pub sender: String,
    #[serde(default, deserialize_with = "nullable")]
    pub date: String,
    #[serde(default, deserialize_with = "nullable")]
    pub body: String,
    #[serde(default, deserialize_with = "nullable")]
    pub snippet: String,
    #[serde(default, rename = "labelIds", alias = "labels", deserialize_with = "nullable_list")]
    pub label_ids: Vec<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub to: String,
    #[serde(default, deserialize_with = "nullable")]
    pub cc: String,
    #[serde(default, deserialize_with = "nullable")]
    pub bcc: String,
    #[serde(default, alias = "listId", deserialize_with = "nullable")]
    pub list_id: String,
}

fn nullable<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl Email {
    /// Body text, falling back to the snippet when the body is empty.
    pub fn body_text(&self) -> &str {
        if self.body.is_empty() {
            &self.snippet
        } else {
            &self.body
        }
    }

    /// Non-empty recipient fields (to, cc, bcc, list-id) joined by spaces.
    pub fn recipients(&self) -> String {
        [&self.to, &self.cc, &self.bcc, &self.list_id]
            .iter()
            .filter(|field| !field.is_empty())
            .map(|field| field.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.label_ids.iter().any(|l| l == label)
    }
}
