pub(crate) fn format_rate(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.1}")
    } else {
        "0".to_string()
    }
}

/// Milliseconds as `850us`, `12.34ms` or `1.50s`.
pub(crate) fn format_ms(ms: f64) -> String {
    if !ms.is_finite() || ms < 0.0 {
        return "n/a".to_string();
    }
    if ms >= 1000.0 {
        return format!("{:.2}s", ms / 1000.0);
    }
    if ms >= 1.0 {
        return format!("{ms:.2}ms");
    }
    format!("{:.0}us", ms * 1000.0)
}

pub(crate) fn format_ms_opt(ms: Option<f64>) -> String {
    ms.map_or_else(|| "-".to_string(), format_ms)
}

pub(crate) fn format_percent(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.1}%")
    } else {
        "0.0%".to_string()
    }
}

/// Share of `part` in `total` as a percentage; 0 when `total` is 0.
pub(crate) fn share(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64) * 100.0 / (total as f64)
}

pub(crate) fn status_label(code: u16) -> String {
    if code == swarmr_core::TRANSPORT_FAILURE_STATUS {
        "transport error".to_string()
    } else {
        code.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_ms_picks_unit() {
        assert_eq!(format_ms(0.25), "250us");
        assert_eq!(format_ms(12.345), "12.35ms");
        assert_eq!(format_ms(1500.0), "1.50s");
        assert_eq!(format_ms(f64::NAN), "n/a");
        assert_eq!(format_ms_opt(None), "-");
    }

    #[test]
    fn share_handles_empty_total() {
        assert_eq!(share(1, 0), 0.0);
        assert_eq!(share(1, 4), 25.0);
        assert_eq!(format_percent(share(1, 3)), "33.3%");
    }
}
