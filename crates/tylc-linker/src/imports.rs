use std::collections::{BTreeMap, BTreeSet};

/// DLL name -> deduplicated function names. `BTreeMap`/`BTreeSet` give
/// deterministic, sorted emission order for free.
#[derive(Debug, Clone, Default)]
pub struct ImportMap {
    dlls: BTreeMap<String, BTreeSet<String>>,
}

impl ImportMap {
    pub fn new() -> Self {
        ImportMap::default()
    }

    pub fn insert(&mut self, dll: &str, function: &str) {
        self.dlls.entry(dll.to_string()).or_default().insert(function.to_string());
    }

    pub fn contains_function(&self, function: &str) -> bool {
        self.dlls.values().any(|fns| fns.contains(function))
    }

    pub fn dll_of(&self, function: &str) -> Option<&str> {
        self.dlls.iter().find(|(_, fns)| fns.contains(function)).map(|(d, _)| d.as_str())
    }

    /// DLLs in sorted order, each with its functions in sorted order — the
    /// exact order the import directory is emitted in.
    pub fn sorted(&self) -> Vec<(&str, Vec<&str>)> {
        self.dlls.iter().map(|(dll, fns)| (dll.as_str(), fns.iter().map(String::as_str).collect())).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dlls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_and_sorts() {
        let mut imports = ImportMap::new();
        imports.insert("kernel32.dll", "ExitProcess");
        imports.insert("kernel32.dll", "ExitProcess");
        imports.insert("kernel32.dll", "GetStdHandle");
        imports.insert("msvcrt.dll", "printf");

        let sorted = imports.sorted();
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].0, "kernel32.dll");
        assert_eq!(sorted[0].1, vec!["ExitProcess", "GetStdHandle"]);
        assert_eq!(sorted[1].0, "msvcrt.dll");
    }
}
