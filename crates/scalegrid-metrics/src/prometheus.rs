//! Prometheus text exposition format.
//!
//! Renders the autoscaler's status snapshot and the newest decision per
//! service as gauges with a `service` label.

use scalegrid_autoscale::AutoscalerStatus;
use scalegrid_core::ScalingDecision;

/// Render autoscaler state into Prometheus text format.
///
/// `latest` holds at most one decision per service.
pub fn render_prometheus(status: &AutoscalerStatus, latest: &[ScalingDecision]) -> String {
    let mut out = String::new();

    out.push_str("# HELP scalegrid_autoscaler_running Whether the control loop is running.\n");
    out.push_str("# TYPE scalegrid_autoscaler_running gauge\n");
    out.push_str(&format!("scalegrid_autoscaler_running {}\n", u8::from(status.running)));

    out.push_str("# HELP scalegrid_managed_services Number of registered services.\n");
    out.push_str("# TYPE scalegrid_managed_services gauge\n");
    out.push_str(&format!(
        "scalegrid_managed_services {}\n",
        status.managed_services.len()
    ));

    out.push_str("# HELP scalegrid_decision_confidence Confidence of the latest decision (0.0-1.0).\n");
    out.push_str("# TYPE scalegrid_decision_confidence gauge\n");
    for d in latest {
        out.push_str(&format!(
            "scalegrid_decision_confidence{{service=\"{}\",direction=\"{}\"}} {:.4}\n",
            label(&d.service_name), d.direction, d.confidence
        ));
    }

    out.push_str("# HELP scalegrid_target_instances Target instance count of the latest decision.\n");
    out.push_str("# TYPE scalegrid_target_instances gauge\n");
    for d in latest {
        out.push_str(&format!(
            "scalegrid_target_instances{{service=\"{}\"}} {}\n",
            label(&d.service_name), d.target_instances
        ));
    }

    out.push_str("# HELP scalegrid_current_instances Instance count seen by the latest decision.\n");
    out.push_str("# TYPE scalegrid_current_instances gauge\n");
    for d in latest {
        out.push_str(&format!(
            "scalegrid_current_instances{{service=\"{}\"}} {}\n",
            label(&d.service_name), d.current_instances
        ));
    }

    out.push_str("# HELP scalegrid_in_cooldown Whether the service is cooling down.\n");
    out.push_str("# TYPE scalegrid_in_cooldown gauge\n");
    for (service, c) in &status.cooldown_status {
        out.push_str(&format!(
            "scalegrid_in_cooldown{{service=\"{}\"}} {}\n",
            label(service),
            u8::from(c.in_cooldown)
        ));
    }

    out.push_str("# HELP scalegrid_cooldown_remaining_seconds Seconds until the service may act again.\n");
    out.push_str("# TYPE scalegrid_cooldown_remaining_seconds gauge\n");
    for (service, c) in &status.cooldown_status {
        out.push_str(&format!(
            "scalegrid_cooldown_remaining_seconds{{service=\"{}\"}} {}\n",
            label(service), c.remaining_seconds
        ));
    }

    out
}

/// Escape a label value: backslash, double quote and newline.
fn label(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}
