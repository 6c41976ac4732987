//! Project information.

/// Link to the project write-up.
pub const PROJECT_REPORT_URL: &str = "https://example.com";

/// Link to the source repository.
pub const GITHUB_URL: &str = "https://github.com/max-y-huang/piranha-plants-as-charade";

/// Prints the title, tagline and project links.
pub fn handle_about() {
    println!();
    println!("Piranha Plants as Charade  v{}", env!("CARGO_PKG_VERSION"));
    println!("Music generation in the style of \"Piranha Plants on Parade\".");
    println!();
    println!("  Project report  {PROJECT_REPORT_URL}");
    println!("  GitHub          {GITHUB_URL}");
    println!();
}
