//! Dynamic loading of built shared objects.
//!
//! Before a library is opened its dynamic symbol table is read with `object`
//! so a missing packed entry point is reported against the file rather than
//! at first call. [`LoadedLibrary`] owns the loader handle; dropping it
//! unloads the library.

use crate::core::{CompileError, CompileResult};
use hashbrown::HashSet;
use libloading::{Library, Symbol};
use object::{Object, ObjectSymbol};
use std::ffi::c_void;
use std::os::raw::c_int;
use std::path::{Path, PathBuf};

/// Signature every packed entry point has.
pub type PackedFn = unsafe extern "C" fn(*mut *mut c_void) -> c_int;

/// Names of the functions `path` defines and exports.
pub fn exported_symbols(path: &Path) -> CompileResult<HashSet<String>> {
    let data = std::fs::read(path)?;
    let file = object::File::parse(&*data).map_err(|err| CompileError::LoadFailed {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let mut names = HashSet::new();
    for symbol in file.dynamic_symbols().chain(file.symbols()) {
        if !symbol.is_definition() || !symbol.is_global() {
            continue;
        }
        if let Ok(name) = symbol.name() {
            names.insert(name.to_string());
        }
    }
    Ok(names)
}

/// Check that every name in `required` is exported by `path`.
pub fn verify_exports(path: &Path, required: &[String]) -> CompileResult<()> {
    let exported = exported_symbols(path)?;
    let missing: Vec<&str> = required
        .iter()
        .filter(|name| !exported.contains(name.as_str()))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        log::debug!("{} exports all {} entry points", path.display(), required.len());
        return Ok(());
    }
    Err(CompileError::LoadFailed {
        path: path.to_path_buf(),
        reason: format!("missing exports: {}", missing.join(", ")),
    })
}

/// An opened shared object.
#[derive(Debug)]
pub struct LoadedLibrary {
    library: Library,
    path: PathBuf,
}

impl LoadedLibrary {
    /// Open `path` with the platform loader.
    pub fn open(path: &Path) -> CompileResult<Self> {
        // SAFETY: generated libraries have no initializers beyond what the C
        // runtime installs.
        let library = unsafe { Library::new(path) }.map_err(|err| CompileError::LoadFailed {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        log::info!("loaded {}", path.display());
        Ok(Self {
            library,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Call packed entry point `name` with `args`.
    ///
    /// # Safety
    /// `args` must match the layout the entry point unpacks: one valid
    /// pointer per output and input, after the reserved slots if the
    /// function has a return slot.
    pub unsafe fn call_packed(&self, name: &str, args: &mut [*mut c_void]) -> CompileResult<i32> {
        let entry: Symbol<PackedFn> =
            self.library
                .get(name.as_bytes())
                .map_err(|_| CompileError::SymbolNotFound {
                    name: name.to_string(),
                })?;
        log::trace!("calling {} with {} packed arguments", name, args.len());
        Ok(entry(args.as_mut_ptr()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_library_reports_loader_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.so");
        match LoadedLibrary::open(&path) {
            Err(CompileError::LoadFailed { path: failed, reason }) => {
                assert_eq!(failed, path);
                assert!(!reason.is_empty());
            }
            other => panic!("expected LoadFailed, got {:?}", other.map(|l| l.path().to_path_buf())),
        }
    }

    #[test]
    fn test_non_object_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not_an_object.so");
        std::fs::write(&path, b"int main() { return 0; }").unwrap();
        assert!(matches!(
            verify_exports(&path, &["_shim_f".to_string()]),
            Err(CompileError::LoadFailed { .. })
        ));
    }

    #[test]
    fn test_exports_of_written_object() {
        use object::write::{Object as WriteObject, Symbol as WriteSymbol, SymbolSection};
        use object::{Architecture, BinaryFormat, Endianness, SectionKind, SymbolFlags, SymbolKind, SymbolScope};

        let mut obj = WriteObject::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
        let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
        let offset = obj.append_section_data(text, &[0x31, 0xc0, 0xc3], 1);
        obj.add_symbol(WriteSymbol {
            name: b"_shim_vec_add".to_vec(),
            value: offset,
            size: 3,
            kind: SymbolKind::Text,
            scope: SymbolScope::Dynamic,
            weak: false,
            section: SymbolSection::Section(text),
            flags: SymbolFlags::None,
        });
        let bytes = obj.write().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.o");
        std::fs::write(&path, bytes).unwrap();

        verify_exports(&path, &["_shim_vec_add".to_string()]).unwrap();
        match verify_exports(&path, &["_shim_vec_add".to_string(), "_shim_other".to_string()]) {
            Err(CompileError::LoadFailed { reason, .. }) => assert!(reason.contains("_shim_other")),
            other => panic!("expected LoadFailed, got {:?}", other),
        }
    }
}
