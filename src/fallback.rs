//! Markup that stands in for a component whose render failed.

use crate::config::Mode;
use crate::dom::serialize::{escape_attribute, escape_text};
use crate::error::{display_path, ComponentFailure};

/// Children to put inside the failed element.
pub fn failure_markup(mode: Mode, failure: &ComponentFailure) -> String {
    match mode {
        Mode::Development => diagnostic(failure),
        Mode::Production => skeleton(&failure.component),
    }
}

/// Inline diagnostic for development. Every value is escaped.
fn diagnostic(failure: &ComponentFailure) -> String {
    let ComponentFailure {
        component,
        file,
        failure,
    } = failure;
    let mut out = format!(
        "<div class=\"ssr-error\" data-component=\"{}\" role=\"alert\">\
         <strong>&lt;{}&gt; failed to render</strong>\
         <p class=\"ssr-error-message\">{}</p>\
         <p class=\"ssr-error-file\">{}</p>",
        escape_attribute(component),
        escape_text(component),
        escape_text(&failure.message),
        escape_text(failure.location.as_deref().unwrap_or(&display_path(file.as_deref()))),
    );
    if let Some(stack) = &failure.stack {
        out.push_str("<pre class=\"ssr-error-stack\">");
        out.push_str(&escape_text(stack));
        out.push_str("</pre>");
    }
    out.push_str("</div>");
    out
}

/// Neutral placeholder for production. Carries no error detail.
fn skeleton(component: &str) -> String {
    format!(
        "<div class=\"ssr-skeleton\" data-component=\"{}\" aria-busy=\"true\"></div>",
        escape_attribute(component)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScriptFailure;
    use std::path::PathBuf;

    fn failure() -> ComponentFailure {
        ComponentFailure {
            component: "my-card".into(),
            file: Some(PathBuf::from("/srv/app/card.js")),
            failure: ScriptFailure {
                message: "Error: <b>boom</b> & more".into(),
                location: Some("/srv/app/card.js:4:11".into()),
                stack: Some("Error: boom\n    at connectedCallback (file:///srv/app/card.js:4:11)".into()),
            },
        }
    }

    #[test]
    fn test_development_diagnostic_is_escaped() {
        let html = failure_markup(Mode::Development, &failure());
        assert!(html.contains("Error: &lt;b&gt;boom&lt;/b&gt; &amp; more"));
        assert!(html.contains("/srv/app/card.js:4:11"));
        assert!(html.contains("<pre class=\"ssr-error-stack\">"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn test_production_skeleton_hides_details() {
        let html = failure_markup(Mode::Production, &failure());
        assert_eq!(
            html,
            "<div class=\"ssr-skeleton\" data-component=\"my-card\" aria-busy=\"true\"></div>"
        );
        assert!(!html.contains("boom"));
        assert!(!html.contains("/srv"));
    }
}
