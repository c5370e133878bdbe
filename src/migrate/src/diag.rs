use log::info;
use warp::Filter;

/// DIAG_PORT is where the diagnostic HTTP endpoint listens.
pub const DIAG_PORT: u16 = 6160;

/// start spawns the diagnostic HTTP service in the background.  It serves
/// GET /debug/pprof, which collects a CPU profile and reports the artifact
/// paths.
pub fn start(port: u16) {
    tokio::spawn(async move {
        let pprof = warp::path!("debug" / "pprof").and_then(|| async move {
            let body = match cpu_profile().await {
                Ok(msg) => msg,
                Err(msg) => msg,
            };
            Ok::<_, warp::Rejection>(warp::reply::html(body))
        });

        info!("diagnostic endpoint listening on 0.0.0.0:{}", port);
        warp::serve(pprof).run(([0, 0, 0, 0], port)).await;
    });
}

#[cfg(unix)]
async fn cpu_profile() -> Result<String, String> {
    use std::fs::File;

    let guard = pprof::ProfilerGuardBuilder::default()
        .frequency(1000)
        .blocklist(&["libc", "libgcc", "pthread", "vdso"])
        .build()
        .map_err(|e| e.to_string())?;

    tokio::time::sleep(tokio::time::Duration::from_secs(10)).await;

    let now_millis = migrate_utils::time::now().as_millis();
    let flamegraph_name = format!("/tmp/migrate_flamegraph_{}.svg", now_millis);

    let report = guard.report().build().map_err(|e| e.to_string())?;
    let file = File::create(&flamegraph_name).map_err(|e| e.to_string())?;
    report.flamegraph(file).map_err(|e| e.to_string())?;

    Ok(format!("generated cpu profile in {}", flamegraph_name))
}

#[cfg(not(unix))]
async fn cpu_profile() -> Result<String, String> {
    Err("/debug/pprof only supported on *unix systems.".to_string())
}
