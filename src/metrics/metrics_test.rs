use super::*;

#[test]
fn test_encode_metrics_exposes_bridge_collectors() {
    COMMANDS_TOTAL.with_label_values(&["CREATE_WATCH"]).inc();
    RECEIVE_REJECTED_TOTAL.inc();

    let body = encode_metrics();

    assert!(body.contains("bridge_connections"));
    assert!(body.contains("bridge_watches"));
    assert!(body.contains("bridge_commands_total{kind=\"CREATE_WATCH\"}"));
    assert!(body.contains("bridge_receive_rejected_total"));
}
