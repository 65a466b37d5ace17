use std::collections::HashMap;

use super::types::Recipient;

/// Substitute `{{variable}}` tokens with recipient-specific values.
///
/// Unknown placeholders render as empty strings in a live send; only the
/// preview path falls back to the fixed sample set.
pub fn render(template: &str, variables: &HashMap<&str, String>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                if let Some(value) = variables.get(key) {
                    output.push_str(value);
                }
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated token: emit literally.
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    output
}

pub fn recipient_variables(recipient: &Recipient) -> HashMap<&'static str, String> {
    let mut variables = HashMap::new();
    variables.insert("email", recipient.email.clone());
    variables.insert(
        "name",
        recipient.display_name.clone().unwrap_or_default(),
    );
    variables.insert("company", recipient.company.clone().unwrap_or_default());
    variables
}

fn sample_variables() -> HashMap<&'static str, String> {
    let mut variables = HashMap::new();
    variables.insert("email", "jane.doe@example.com".to_string());
    variables.insert("name", "Jane Doe".to_string());
    variables.insert("company", "Example Corp".to_string());
    variables
}

/// Preview rendering with the fixed sample-data set. Never used by live send.
pub fn render_preview(template: &str) -> String {
    render(template, &sample_variables())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recipient() -> Recipient {
        Recipient {
            id: 7,
            email: "li.wei@corp.example".to_string(),
            display_name: Some("Li Wei".to_string()),
            company: Some("Corp".to_string()),
        }
    }

    #[test]
    fn render_substitutes_recipient_fields() {
        let variables = recipient_variables(&recipient());
        let body = render("Hi {{name}} at {{company}} ({{email}})", &variables);
        assert_eq!(body, "Hi Li Wei at Corp (li.wei@corp.example)");
    }

    #[test]
    fn unknown_placeholder_renders_empty_in_live_send() {
        let variables = recipient_variables(&recipient());
        assert_eq!(render("x{{discount}}y", &variables), "xy");
    }

    #[test]
    fn missing_display_name_renders_empty() {
        let mut recipient = recipient();
        recipient.display_name = None;
        let variables = recipient_variables(&recipient);
        assert_eq!(render("Hi {{name}}!", &variables), "Hi !");
    }

    #[test]
    fn unterminated_token_is_left_literal() {
        let variables = recipient_variables(&recipient());
        assert_eq!(render("Hi {{name", &variables), "Hi {{name");
    }

    #[test]
    fn preview_uses_sample_data() {
        assert_eq!(render_preview("{{name}}"), "Jane Doe");
    }
}
