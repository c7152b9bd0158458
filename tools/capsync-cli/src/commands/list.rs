//! List displays and windows.

use capsync_platform_core::primary_display;

pub fn run(json: bool) -> anyhow::Result<()> {
    let backend = capsync_capture_engine::default_backend();
    let displays = backend.displays()?;
    let windows = backend.windows()?;

    if json {
        let doc = serde_json::json!({ "displays": displays, "windows": windows });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    let primary = primary_display(&displays).map(|d| d.id);
    println!("Displays ({}):", displays.len());
    for d in &displays {
        println!(
            "  [{}] {} {} at ({}, {}) scale {}x{}",
            d.id,
            d.name,
            d.resolution(),
            d.x,
            d.y,
            d.scale_factor,
            if Some(d.id) == primary { " (primary)" } else { "" }
        );
    }

    println!();
    println!("Windows ({}):", windows.len());
    for w in &windows {
        println!(
            "  [{}] {} \"{}\" {}x{} at ({}, {})",
            w.id, w.app_name, w.title, w.width, w.height, w.x, w.y
        );
    }
    Ok(())
}
