use serde_json::{json, Value};
use crate::cli::OutputFormat;

/// Output a success message in the appropriate format.
///
/// In text mode `text` is printed after the message when present; in JSON mode
/// the fields of `data` are merged into the response object.
pub fn output_success(
    output_format: &OutputFormat,
    message: &str,
    data: Value,
    text: Option<&str>,
) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => {
            let mut response = json!({
                "success": true,
                "message": message
            });

            if let (Some(response), Value::Object(fields)) = (response.as_object_mut(), data) {
                response.extend(fields);
            }

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        OutputFormat::Text => {
            println!("✓ {}", message);
            if let Some(text) = text {
                println!("{}", text);
            }
        }
    }
    Ok(())
}
