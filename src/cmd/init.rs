//! `council init`.

use anyhow::Result;

pub fn cmd_init(project_dir: &std::path::Path) -> Result<()> {
    use council::init::{init_project, is_initialized};
    use council::ui::icons::{CHECK, FOLDER};

    let was_initialized = is_initialized(project_dir);
    let result = init_project(project_dir)?;

    if result.created {
        println!(
            "{}Initialized council project at {}",
            CHECK,
            result.council_dir.display()
        );
        println!();
        println!("{}.council/", FOLDER);
        println!("  ├── council.toml    # Memory, model and UI defaults");
        println!("  ├── pipeline.yaml   # Steps and debate groups");
        println!("  ├── sessions/       # One directory per run");
        println!("  └── logs/           # Daily log files");
        println!();
        println!("Next steps:");
        println!("  1. Set OPENROUTER_API_KEY (or another provider key) in .env");
        println!("  2. Run `council plan` to review the unit order");
        println!("  3. Run `council run NVDA 2024-05-10`");
    } else if was_initialized {
        println!(
            "Council project already initialized at {}",
            result.council_dir.display()
        );
        for path in &result.written {
            println!("  restored {}", path.display());
        }
    }

    Ok(())
}
