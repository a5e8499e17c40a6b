//! Landing page.

use axum::{extract::State, response::Html};

use crate::api::server::AppState;
use crate::metrics::BuildInfo;

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Small HTML page pointing at the other endpoints.
pub async fn landing_page(State(state): State<AppState>) -> Html<String> {
    let build = BuildInfo::current();
    let config = &state.config;

    let endpoints: String = [
        (config.telemetry_path.as_str(), "metrics"),
        (config.probe_path.as_str(), "probe remote"),
        (config.health_path.as_str(), "health check"),
        (config.remotes_path.as_str(), "list remotes"),
        (config.config_path.as_str(), "exporter config"),
    ]
    .iter()
    .map(|(path, what)| {
        let path = escape(path);
        format!("            <li><a href=\"{path}\">{path}</a>: {what}</li>\n")
    })
    .collect();
    let probe_path = escape(&config.probe_path);

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="UTF-8">
        <meta name="viewport" content="width=device-width, initial-scale=1.0">
        <title>Rclone Exporter</title>
        <style>
            body {{ font-family: sans-serif; margin: 40px auto; max-width: 700px; line-height: 1.6; color: #222; }}
            h1, .subtitle, footer {{ text-align: center; }}
            .subtitle, footer {{ color: #555; }}
            ul {{ list-style: none; padding-left: 0; }}
            code {{ background: #f5f5f5; padding: 2px 5px; border-radius: 3px; }}
        </style>
    </head>
    <body>
        <h1>Rclone Exporter</h1>
        <p class="subtitle">Prometheus exporter for rclone remote monitoring</p>
        <p>Version <strong>{version}</strong> (commit {commit}), up {uptime}</p>
        <h2>Available Endpoints</h2>
        <ul>
{endpoints}        </ul>
        <h2>Usage Example</h2>
        <p>Probe a specific remote:</p>
        <p><code>{probe_path}?remote=&lt;remote_name&gt;</code></p>
        <p>Example: <code>{probe_path}?remote=myremote:</code></p>
        <footer>Build Date: {build_date}</footer>
    </body>
</html>
"#,
        version = escape(build.version),
        commit = escape(build.commit),
        build_date = escape(build.build_date),
        uptime = state.uptime(),
    ))
}

#[cfg(test)]
mod tests {
    use super::super::create_router;
    use super::super::test_support::{get, state};
    use super::*;
    use axum::http::{StatusCode, header::CONTENT_TYPE};

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("/a?<b>&\"c\""), "/a?&lt;b&gt;&amp;&quot;c&quot;");
    }

    #[tokio::test]
    async fn lists_configured_endpoints() {
        let (response, body) = get(create_router(state()), "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .get(CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/html")
        );
        assert!(body.contains("<a href=\"/metrics\">"));
        assert!(body.contains("/probe?remote=myremote:"));
    }
}
