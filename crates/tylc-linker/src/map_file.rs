use std::fmt::Write as _;

use crate::symbol_map::GlobalSymbolMap;

/// Renders a human-readable MAP listing: every globally visible symbol,
/// sorted by RVA, with its owning module and size.
pub fn render(output_name: &str, entry_rva: u32, globals: &GlobalSymbolMap) -> String {
    let mut entries: Vec<_> = globals.iter().collect();
    entries.sort_by_key(|(_, sym)| sym.final_rva);

    let mut out = String::new();
    let _ = writeln!(out, "# MAP for {output_name}");
    let _ = writeln!(out, "# entry point RVA: 0x{entry_rva:08X}");
    let _ = writeln!(out);
    let _ = writeln!(out, "{:<10} {:<8} {:<24} {}", "RVA", "SIZE", "SYMBOL", "MODULE");
    for (name, sym) in entries {
        let _ = writeln!(out, "0x{:08X} 0x{:<6X} {:<24} {}", sym.final_rva, sym.size, name, sym.source_module);
    }
    out
}
