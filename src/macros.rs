/// Logs a structured line with timestamp, level, component, pid, tid, and message.
/// Usage:
/// ```rust
/// use log::Level;
/// trace_consumer::trace_log!(Level::Info, "consumer", "Consumer opened");
/// trace_consumer::trace_log!(Level::Warn, "facility", "Session {} lost {} records", "demo", 3);
/// ```
/// Logs like:
/// [2025-04-25T16:32:10+02:00][DEBUG][consumer][pid=4568][tid=ThreadId(3)] Your message here
#[macro_export]
macro_rules! trace_log {
    ($level:expr, $component:expr, $fmt:expr $(, $($arg:tt)+)?) => {
        $crate::__private::log::log!(
            $level,
            concat!(
                "[", "{}", "]",          // timestamp
                "[", "{}", "]",          // level via Display
                "[", $component, "]",    // component
                "[pid=", "{}", "]",      // pid
                "[tid=", "{:?}", "] ",   // tid
                $fmt                     // your message
            ),
            $crate::__private::chrono::Local::now().to_rfc3339(),
            $level,
            std::process::id(),
            std::thread::current().id()
            $(, $($arg)+)?
        )
    };
}
