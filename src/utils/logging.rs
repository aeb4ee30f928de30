use std::time::Instant;
use tracing::{debug, error, info, warn};

pub struct Logger;

impl Logger {
    pub fn init() {
        tracing_subscriber::fmt()
            .with_env_filter("static_css_extract=debug")
            .with_target(false)
            .init();
    }

    pub fn build_start(root: &str, outdir: &str) {
        info!("🎨 static-css-extract - Build");
        info!("═══════════════════════════════════════");
        info!("📁 Input: {}", root);
        info!("📦 Output: {}", outdir);
    }

    pub fn extracting_module(id: &str) {
        debug!("🔍 Extracting css blocks: {}", id);
    }

    pub fn module_skipped(id: &str) {
        debug!("⏭️  No css blocks: {}", id);
    }

    pub fn blocks_found(id: &str, count: usize) {
        debug!("✂️  {} css block(s) in {}", count, id);
    }

    pub fn evaluating_module(id: &str) {
        debug!("⚡ Evaluating module: {}", id);
    }

    pub fn build_complete(
        module_count: usize,
        block_count: usize,
        stylesheet_bytes: usize,
        build_time: std::time::Duration,
        outdir: &str,
    ) {
        info!("");
        info!("📊 Extraction Statistics:");
        info!("  • Modules processed: {}", module_count);
        info!("  • css blocks folded: {}", block_count);
        info!("  • Stylesheet size: {} bytes", stylesheet_bytes);
        info!("  • Build time: {:.2?}", build_time);
        info!("  • Output directory: {}", outdir);
        info!("");
        info!("✅ Build completed successfully!");
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }
}

pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
