use crate::error::ErrorCode;

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_ascii_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if ch.is_ascii_graphic() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A degraded-but-continuing condition, rendered as one grep-friendly key=value line.
#[derive(Debug, Clone)]
pub struct WarnEvent<'a> {
    pub code: ErrorCode,
    pub stage: &'a str,
    pub action: &'a str,
    pub site: &'a str,
    pub file_key: &'a str,
    pub retry: &'a str,
    pub reason: &'a str,
    pub err: &'a str,
}

impl<'a> WarnEvent<'a> {
    pub fn new(code: ErrorCode, stage: &'a str, action: &'a str) -> Self {
        Self {
            code,
            stage,
            action,
            site: "",
            file_key: "",
            retry: "",
            reason: "",
            err: "",
        }
    }

    pub fn render(&self) -> String {
        format!(
            "PASS_WARN code={} stage={} action={} site={} file_key={} retry={} reason={} err={}",
            self.code.as_str(),
            sanitize_value(self.stage),
            sanitize_value(self.action),
            sanitize_value(self.site),
            sanitize_value(self.file_key),
            sanitize_value(self.retry),
            sanitize_value(self.reason),
            sanitize_value(self.err),
        )
    }
}

pub fn emit(event: &WarnEvent<'_>) {
    tracing::warn!(code = event.code.as_str(), "{}", event.render());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_value_rewrites_whitespace() {
        assert_eq!(sanitize_value("a b\tc"), "a_b_c");
    }

    #[test]
    fn sanitize_value_falls_back_for_empty() {
        assert_eq!(sanitize_value("   "), "na");
    }

    #[test]
    fn render_fills_unset_fields_with_na() {
        let event = WarnEvent {
            site: "north",
            file_key: "20230401-120000-NOAA19",
            reason: "missing raw image",
            ..WarnEvent::new(ErrorCode::E004MissingRawImage, "scan", "skip")
        };
        assert_eq!(
            event.render(),
            "PASS_WARN code=E004_MISSING_RAW_IMAGE stage=scan action=skip site=north \
             file_key=20230401-120000-NOAA19 retry=na reason=missing_raw_image err=na"
        );
    }
}
