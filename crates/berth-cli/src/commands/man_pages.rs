use super::EXIT_SUCCESS;
use clap::CommandFactory;
use std::path::Path;

fn write_page(cmd: clap::Command, path: &Path) -> Result<(), String> {
    let mut buf = Vec::new();
    clap_mangen::Man::new(cmd)
        .render(&mut buf)
        .map_err(|e| format!("man page render failed: {e}"))?;
    std::fs::write(path, &buf).map_err(|e| format!("failed to write {}: {e}", path.display()))
}

/// Writes `berth.1` plus one `berth-<command>.1` page per subcommand.
pub fn run<C: CommandFactory>(dir: &Path) -> Result<u8, String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("failed to create {}: {e}", dir.display()))?;
    let cmd = C::command();
    for sub in cmd.get_subcommands() {
        let page = dir.join(format!("berth-{}.1", sub.get_name()));
        write_page(sub.clone(), &page)?;
    }
    write_page(cmd, &dir.join("berth.1"))?;
    println!("man pages written to {}", dir.display());
    Ok(EXIT_SUCCESS)
}
