//! Install-trigger page.
//!
//! Newer OS versions refuse to open a manifest URL handed over directly by
//! another app, but follow it from a page's own navigation.

use crate::downgrader::error::ServerError;
use handlebars::Handlebars;
use std::collections::BTreeMap;

const INSTALL_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Installing {{name}}</title>
</head>
<body>
<p>Installing {{name}} {{version}}. Keep this page open until the install prompt appears.</p>
<p><a href="{{manifest_url}}">Tap here if nothing happens.</a></p>
<script type="text/javascript">
window.location.href = {{{manifest_url_js}}};
</script>
</body>
</html>
"#;

/// Renders the page that navigates to `manifest_url`.
pub fn render_install_page(
    bundle_id: &str,
    version: &str,
    manifest_url: &str,
) -> Result<String, ServerError> {
    let mut handlebars = Handlebars::new();
    handlebars
        .register_template_string("install.html", INSTALL_TEMPLATE)
        .map_err(|e| ServerError::Template(format!("failed to register install template: {e}")))?;

    // JSON string literals are valid JavaScript string literals.
    let manifest_url_js = serde_json::to_string(manifest_url)
        .map_err(|e| ServerError::Template(e.to_string()))?
        .replace("</", "<\\/");

    let mut data = BTreeMap::new();
    data.insert("name", bundle_id.to_string());
    data.insert("version", version.to_string());
    data.insert("manifest_url", manifest_url.to_string());
    data.insert("manifest_url_js", manifest_url_js);

    handlebars
        .render("install.html", &data)
        .map_err(|e| ServerError::Template(format!("failed to render install page: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_navigates_to_manifest() {
        let url = "itms-services://?action=download-manifest&url=https%3A%2F%2Fsvc";
        let html = render_install_page("com.example.app", "2.3.1", url).unwrap();

        assert!(html.contains(&format!("window.location.href = \"{url}\";")));
        assert!(html.contains("Installing com.example.app 2.3.1"));
        // handlebars HTML-escapes the attribute copy
        assert!(html.contains("href=\"itms-services://?action"));
        assert!(html.contains("&amp;url"));
    }

    #[test]
    fn script_literal_cannot_close_the_tag() {
        let html = render_install_page("x", "1", "itms-services://</script><b>").unwrap();
        assert!(!html.contains("</script><b>"));
    }
}
