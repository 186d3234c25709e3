use std::borrow::Cow;
use std::sync::LazyLock;

use ammonia::Builder;

use crate::models::problem::{Html5ProblemStatement, ProblemStatement};
use crate::pandoc::{RenderError, StatementRenderer};

const FIELD_NAMES: [&str; 5] = ["legend", "input", "output", "notes", "scoring"];

static SANITIZER: LazyLock<Builder<'static>> = LazyLock::new(|| {
    let mut builder = Builder::default();
    builder
        .add_generic_attributes(["class", "style"])
        .add_tag_attributes("a", ["href"])
        .add_tag_attributes("area", ["href"])
        .add_tag_attributes("img", ["src"])
        .add_tag_attributes("blockquote", ["cite"])
        .add_tag_attributes("q", ["cite"])
        .attribute_filter(|_element, attribute, value| {
            if attribute == "style" {
                filter_style(value)
            } else {
                Some(Cow::Borrowed(value))
            }
        });
    builder
});

const ALLOWED_STYLES: [(&str, &str); 6] = [
    ("text-align", "center"),
    ("text-align", "left"),
    ("text-align", "right"),
    ("display", "block"),
    ("display", "inline"),
    ("display", "inline-block"),
];

/// Keep only `text-align` and `display` declarations with allow-listed values.
fn filter_style(value: &str) -> Option<Cow<'_, str>> {
    let kept: Vec<String> = value
        .split(';')
        .filter_map(|decl| {
            let (prop, val) = decl.split_once(':')?;
            let prop = prop.trim().to_ascii_lowercase();
            let val = val.trim().to_ascii_lowercase();
            ALLOWED_STYLES
                .contains(&(prop.as_str(), val.as_str()))
                .then(|| format!("{prop}: {val}"))
        })
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(Cow::Owned(kept.join("; ")))
    }
}

fn sanitize(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    SANITIZER.clean(html).to_string()
}

/// Wrap a non-empty source in the document envelope the typesetter expects.
fn wrap(source: &str) -> String {
    if source.is_empty() {
        return String::new();
    }
    format!("\\begin{{document}}\n{source}\n\\end{{document}}\n")
}

/// Render a statement to sanitized HTML in one batch call.
///
/// Either all five fields render or the whole statement is rejected.
pub async fn build_statement(
    renderer: &dyn StatementRenderer,
    statement: &ProblemStatement,
) -> Result<Html5ProblemStatement, RenderError> {
    let request: Vec<String> = statement
        .trimmed()
        .into_fields()
        .iter()
        .map(|field| wrap(field))
        .collect();

    let results = renderer.batch_convert(&request).await?;
    if results.len() != request.len() {
        return Err(RenderError::FieldCount {
            expected: request.len(),
            actual: results.len(),
        });
    }

    let errors: Vec<String> = results
        .iter()
        .zip(FIELD_NAMES)
        .filter(|(result, _)| !result.error.is_empty())
        .map(|(result, name)| format!("{name}: {}", result.error))
        .collect();
    if !errors.is_empty() {
        return Err(RenderError::Conversion(errors));
    }

    let mut fields: [String; 5] = Default::default();
    for (slot, result) in fields.iter_mut().zip(&results) {
        *slot = sanitize(&result.output);
    }
    Ok(Html5ProblemStatement::from(fields))
}
