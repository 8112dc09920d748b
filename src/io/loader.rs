use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};

use super::Program;

pub const PROGRAM_FILE_PATH: &str = "data/programs.txt";

const PROGRAM_CARD: &str = "// PROGRAM";

/// Reads the program manifest at `path` and returns the programs it describes,
/// in file order.
pub fn load_programs(path: impl AsRef<Path>) -> Result<Vec<Program>> {
    let path = path.as_ref();
    let manifest = fs::read_to_string(path)
        .with_context(|| format!("Failed to read program manifest {}", path.display()))?;

    parse_programs(&manifest).with_context(|| format!("Failed to parse program manifest {}", path.display()))
}

/// Parses a program manifest. Each program is a single control card:
///
/// ```text
/// // PROGRAM <size> <color>
/// ```
///
/// Both fields are hexadecimal; the color is an ARGB word. Blank lines and
/// `#` comments are skipped.
pub fn parse_programs(manifest: &str) -> Result<Vec<Program>> {
    let mut programs = Vec::new();

    for (line_num, line) in manifest.lines().enumerate() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let card = line
            .strip_prefix(PROGRAM_CARD)
            .ok_or_else(|| anyhow!("line {}: expected a program card, found {:?}", line_num + 1, line))?;

        let program = parse_card(card).with_context(|| format!("line {}", line_num + 1))?;
        programs.push(program);
    }

    Ok(programs)
}

fn parse_card(card: &str) -> Result<Program> {
    let fields: Vec<&str> = card.split_whitespace().collect();

    if fields.len() != 2 {
        bail!("program card needs a size and a color, found {} fields", fields.len());
    }

    let size = usize::from_str_radix(strip_hex_prefix(fields[0]), 16)
        .with_context(|| format!("Failed to parse hex size: {}", fields[0]))?;
    let color = u32::from_str_radix(strip_hex_prefix(fields[1]), 16)
        .with_context(|| format!("Failed to parse hex color: {}", fields[1]))?;

    if size == 0 {
        bail!("program size must be non-zero");
    }

    Ok(Program::new(size, color))
}

fn strip_hex_prefix(field: &str) -> &str {
    field
        .strip_prefix("0x")
        .or_else(|| field.strip_prefix("0X"))
        .unwrap_or(field)
}
