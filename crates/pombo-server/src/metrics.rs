// Metrics module for observability
// Describes the counters and gauges emitted across the gateway

use metrics::{describe_counter, describe_gauge};

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn init_metrics() {
    // Connection metrics
    describe_gauge!("pombo_connections", "Current number of open connections");
    describe_counter!(
        "pombo_connections_accepted_total",
        "Total number of accepted WebSocket connections"
    );
    describe_counter!("pombo_evictions_total", "Total number of evicted connections");
    describe_counter!(
        "pombo_heartbeat_failures_total",
        "Total number of failed heartbeat probes"
    );

    // Delivery metrics
    describe_counter!(
        "pombo_messages_enqueued_total",
        "Total number of messages accepted onto the delivery queue"
    );
    describe_counter!(
        "pombo_messages_delivered_total",
        "Total number of messages written to client sockets"
    );
    describe_counter!(
        "pombo_messages_dropped_total",
        "Total number of messages shed because the delivery queue was full"
    );
    describe_counter!(
        "pombo_delivery_errors_total",
        "Total number of failed socket writes"
    );

    // Cluster metrics
    describe_gauge!("pombo_cluster_members", "Current number of known cluster members");
}
