//! Status glyphs with plain-text fallbacks for terminals without emoji.

use console::Emoji;

pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "[OK] ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "[ERR] ");
pub static PAUSE: Emoji<'_, '_> = Emoji("⏸️  ", "[PAUSED] ");
pub static SPARKLE: Emoji<'_, '_> = Emoji("✨ ", "* ");
pub static FILE_MOD: Emoji<'_, '_> = Emoji("📝 ", "~ ");
pub static ROLLBACK: Emoji<'_, '_> = Emoji("↩️  ", "<- ");
