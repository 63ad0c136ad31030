use time::{format_description, OffsetDateTime};

/// Env override wins, otherwise the current UTC time in `pattern`.
fn stamp(var: &str, now: OffsetDateTime, pattern: &str) -> String {
    println!("cargo:rerun-if-env-changed={}", var);
    std::env::var(var).unwrap_or_else(|_| {
        format_description::parse(pattern)
            .ok()
            .and_then(|fmt| now.format(&fmt).ok())
            .unwrap_or_else(|| "unknown".into())
    })
}

fn main() {
    let now = OffsetDateTime::now_utc();
    let stamps = [
        ("RASTERTRACE_BUILD_DATE", "[year]-[month]-[day]"),
        ("RASTERTRACE_BUILD_TIME", "[hour]:[minute]:[second] UTC"),
    ];
    for (var, pattern) in stamps {
        println!("cargo:rustc-env={}={}", var, stamp(var, now, pattern));
    }
}
