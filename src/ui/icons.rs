//! Shared UI icons.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK]");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR]");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "*");
pub static STOP: Emoji<'_, '_> = Emoji("⏹️  ", "[STOP]");

pub static RUNNING: Emoji<'_, '_> = Emoji("▶️  ", "[>]");
pub static DEBATE: Emoji<'_, '_> = Emoji("💬 ", "[D]");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "[T]");
pub static FOLDER: Emoji<'_, '_> = Emoji("📁 ", "");
