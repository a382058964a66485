/// Declares a typed stat name as a `pub const`.
///
/// ```
/// use pigeon::metric;
///
/// metric!(REQUESTS, "http.requests", Count);
/// metric!(IN_FLIGHT, "http.in_flight", Gauge);
/// metric!(LATENCY, "http.latency", Timing);
///
/// assert_eq!(REQUESTS.get_name(), "http.requests");
/// ```
#[macro_export]
macro_rules! metric {
    ( $binding:ident, $metric_name:literal, Count ) => {
        pub const $binding: $crate::metric::MetricName<$crate::metric::MetricType::Count> =
            $crate::metric::MetricName::count($metric_name);
    };
    ( $binding:ident, $metric_name:literal, Gauge ) => {
        pub const $binding: $crate::metric::MetricName<$crate::metric::MetricType::Gauge> =
            $crate::metric::MetricName::gauge($metric_name);
    };
    ( $binding:ident, $metric_name:literal, Timing ) => {
        pub const $binding: $crate::metric::MetricName<$crate::metric::MetricType::Timing> =
            $crate::metric::MetricName::timing($metric_name);
    };
}
