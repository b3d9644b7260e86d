//! Source/bytecode listing for `-s`: each source line is echoed with the
//! instructions emitted for it.

use crate::bytecode::ir::Program;

/// Render the interleaved listing. The epilogue continuation is not part of
/// any source line and is omitted.
pub fn listing(source: &[u8], program: &Program) -> String {
    let text = String::from_utf8_lossy(source);
    let lines: Vec<&str> = text.lines().collect();
    let mut out = String::new();

    for (i, mark) in program.marks.iter().enumerate() {
        let end = program
            .marks
            .get(i + 1)
            .map(|next| next.pos)
            .unwrap_or(program.epilogue)
            .min(program.epilogue);
        if let Some(line) = lines.get(mark.line - 1) {
            out.push_str(&format!("{}: {}\n", mark.line, line));
        }
        for op in &program.code[mark.pos.min(program.epilogue)..end] {
            out.push_str(&format!("    {}\n", op));
        }
    }
    out
}

pub fn print_listing(source: &[u8], program: &Program) {
    print!("{}", listing(source, program));
}
