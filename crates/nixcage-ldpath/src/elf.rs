//! ELF binary introspection.
//!
//! Two questions are answered here: what ABI a binary was built for
//! ([`read_identity`]), and which directory holds the dynamic loader it
//! requests ([`read_interp_dir`]). Both walk the headers with a single
//! routine parameterized over the 32-/64-bit class layout, and both fail
//! totally — a short read or magic mismatch yields `None`, never a partially
//! populated result.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Size of the ELF identification prefix (`e_ident`).
const EI_NIDENT: usize = 16;
/// Index of the class byte within `e_ident`.
const EI_CLASS: usize = 4;
/// The four magic bytes opening every ELF file.
const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
/// `e_ident[EI_CLASS]` value for 32-bit objects.
const ELFCLASS32: u8 = 1;
/// `e_ident[EI_CLASS]` value for 64-bit objects.
const ELFCLASS64: u8 = 2;
/// Program header type naming the program interpreter.
const PT_INTERP: u32 = 3;
/// Sanity cap on the interpreter path length.
const INTERP_MAX_BYTES: u64 = 4096;

/// ELF word size, from the identification class byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElfClass {
    /// 32-bit object.
    Elf32,
    /// 64-bit object.
    Elf64,
}

impl ElfClass {
    /// Word size in bits.
    #[must_use]
    pub const fn word_size(self) -> u8 {
        match self {
            Self::Elf32 => 32,
            Self::Elf64 => 64,
        }
    }

    const fn from_ident_byte(byte: u8) -> Option<Self> {
        match byte {
            ELFCLASS32 => Some(Self::Elf32),
            ELFCLASS64 => Some(Self::Elf64),
            _ => None,
        }
    }

    /// Field offsets and record sizes for this class.
    const fn layout(self) -> ClassLayout {
        match self {
            Self::Elf32 => ClassLayout {
                ehdr_size: 52,
                e_machine: 18,
                e_phoff: 28,
                e_phentsize: 42,
                e_phnum: 44,
                phdr_size: 32,
                p_type: 0,
                p_offset: 4,
                p_filesz: 16,
            },
            Self::Elf64 => ClassLayout {
                ehdr_size: 64,
                e_machine: 18,
                e_phoff: 32,
                e_phentsize: 54,
                e_phnum: 56,
                phdr_size: 56,
                p_type: 0,
                p_offset: 8,
                p_filesz: 32,
            },
        }
    }
}

/// Byte offsets of the header fields consulted, per class.
///
/// Word-sized fields (`e_phoff`, `p_offset`, `p_filesz`) are read with the
/// class's word width; everything else has a fixed width in both classes.
struct ClassLayout {
    ehdr_size: usize,
    e_machine: usize,
    e_phoff: usize,
    e_phentsize: usize,
    e_phnum: usize,
    phdr_size: usize,
    p_type: usize,
    p_offset: usize,
    p_filesz: usize,
}

/// ABI identity of an ELF binary.
///
/// Two identities are compatible iff both fields are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElfIdentity {
    /// Word size class.
    pub class: ElfClass,
    /// Machine architecture code (`e_machine`).
    pub machine: u16,
}

impl ElfIdentity {
    /// Returns `true` if a library with identity `other` can be loaded by a
    /// process with this identity.
    #[must_use]
    pub fn is_compatible(&self, other: &Self) -> bool {
        self == other
    }
}

fn read_u16(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_ne_bytes([bytes[0], bytes[1]]))
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    let bytes = buf.get(offset..offset + 4)?;
    Some(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Reads a word-sized field: u32 for ELF32, u64 for ELF64, widened to u64.
fn read_word(buf: &[u8], offset: usize, class: ElfClass) -> Option<u64> {
    match class {
        ElfClass::Elf32 => read_u32(buf, offset).map(u64::from),
        ElfClass::Elf64 => {
            let bytes = buf.get(offset..offset + 8)?;
            let mut array = [0u8; 8];
            array.copy_from_slice(bytes);
            Some(u64::from_ne_bytes(array))
        }
    }
}

/// Opens `path`, validates the magic, and returns the class plus the full
/// class-sized ELF header.
fn open_and_read_ehdr(path: &Path) -> Option<(File, ElfClass, Vec<u8>)> {
    let mut file = File::open(path).ok()?;

    let mut ident = [0u8; EI_NIDENT];
    file.read_exact(&mut ident).ok()?;
    if ident[..ELF_MAGIC.len()] != ELF_MAGIC {
        return None;
    }
    let class = ElfClass::from_ident_byte(ident[EI_CLASS])?;

    file.seek(SeekFrom::Start(0)).ok()?;
    let mut ehdr = vec![0u8; class.layout().ehdr_size];
    file.read_exact(&mut ehdr).ok()?;
    Some((file, class, ehdr))
}

/// Extracts the ABI identity of the binary at `path`.
///
/// Returns `None` if the file cannot be opened, is shorter than the header,
/// or lacks the ELF magic.
#[must_use]
pub fn read_identity(path: &Path) -> Option<ElfIdentity> {
    let (_file, class, ehdr) = open_and_read_ehdr(path)?;
    let machine = read_u16(&ehdr, class.layout().e_machine)?;
    Some(ElfIdentity { class, machine })
}

/// Returns the directory containing the dynamic loader named in the
/// `PT_INTERP` segment of the binary at `path`.
///
/// Returns `None` for statically linked, unreadable, or malformed binaries;
/// a read failing partway never yields a partial directory.
#[must_use]
pub fn read_interp_dir(path: &Path) -> Option<PathBuf> {
    let interp = read_interp(path)?;
    let dir = interp.parent()?;
    if dir.as_os_str().is_empty() {
        return None;
    }
    Some(dir.to_path_buf())
}

fn read_interp(path: &Path) -> Option<PathBuf> {
    let (mut file, class, ehdr) = open_and_read_ehdr(path)?;
    let layout = class.layout();

    let phoff = read_word(&ehdr, layout.e_phoff, class)?;
    let phentsize = u64::from(read_u16(&ehdr, layout.e_phentsize)?);
    let phnum = read_u16(&ehdr, layout.e_phnum)?;

    let mut phdr = vec![0u8; layout.phdr_size];
    for index in 0..u64::from(phnum) {
        let offset = phoff.checked_add(index.checked_mul(phentsize)?)?;
        file.seek(SeekFrom::Start(offset)).ok()?;
        file.read_exact(&mut phdr).ok()?;

        if read_u32(&phdr, layout.p_type)? != PT_INTERP {
            continue;
        }

        let p_offset = read_word(&phdr, layout.p_offset, class)?;
        let p_filesz = read_word(&phdr, layout.p_filesz, class)?;
        if p_filesz == 0 || p_filesz > INTERP_MAX_BYTES {
            return None;
        }

        file.seek(SeekFrom::Start(p_offset)).ok()?;
        let mut raw = vec![0u8; usize::try_from(p_filesz).ok()?];
        file.read_exact(&mut raw).ok()?;

        // The segment carries the path NUL-terminated.
        while raw.last() == Some(&0) {
            let _ = raw.pop();
        }
        if raw.is_empty() {
            return None;
        }
        return Some(PathBuf::from(std::ffi::OsStr::from_bytes(&raw)));
    }
    None
}


#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use super::testutil::build_elf;
    use super::*;

    fn write_fixture(bytes: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("binary");
        fs::write(&path, bytes).expect("write fixture");
        (dir, path)
    }

    #[test]
    fn identity_of_64bit_binary() {
        let (_dir, path) = write_fixture(&build_elf(ElfClass::Elf64, 62, None));
        let id = read_identity(&path).expect("should identify");
        assert_eq!(id.class, ElfClass::Elf64);
        assert_eq!(id.class.word_size(), 64);
        assert_eq!(id.machine, 62);
    }

    #[test]
    fn identity_of_32bit_binary() {
        let (_dir, path) = write_fixture(&build_elf(ElfClass::Elf32, 3, None));
        let id = read_identity(&path).expect("should identify");
        assert_eq!(id.class, ElfClass::Elf32);
        assert_eq!(id.machine, 3);
    }

    #[test]
    fn identity_fails_on_non_elf() {
        let (_dir, path) = write_fixture(b"#!/bin/sh\necho hello\n");
        assert!(read_identity(&path).is_none());
    }

    #[test]
    fn identity_fails_on_truncated_64bit_header() {
        let image = build_elf(ElfClass::Elf64, 62, None);
        let (_dir, path) = write_fixture(&image[..40]);
        assert!(read_identity(&path).is_none());
    }

    #[test]
    fn identity_fails_on_truncated_32bit_header() {
        let image = build_elf(ElfClass::Elf32, 3, None);
        let (_dir, path) = write_fixture(&image[..20]);
        assert!(read_identity(&path).is_none());
    }

    #[test]
    fn identity_fails_on_missing_file() {
        assert!(read_identity(Path::new("/nonexistent/binary")).is_none());
    }

    #[test]
    fn identity_fails_on_unknown_class_byte() {
        let mut image = build_elf(ElfClass::Elf64, 62, None);
        image[EI_CLASS] = 9;
        let (_dir, path) = write_fixture(&image);
        assert!(read_identity(&path).is_none());
    }

    #[test]
    fn compatibility_requires_both_fields_equal() {
        let a = ElfIdentity {
            class: ElfClass::Elf64,
            machine: 62,
        };
        let b = ElfIdentity {
            class: ElfClass::Elf32,
            machine: 62,
        };
        let c = ElfIdentity {
            class: ElfClass::Elf64,
            machine: 183,
        };
        assert!(a.is_compatible(&a));
        assert!(!a.is_compatible(&b));
        assert!(!a.is_compatible(&c));
    }

    #[test]
    fn interp_dir_of_64bit_binary() {
        let image = build_elf(ElfClass::Elf64, 62, Some("/lib64/ld-linux-x86-64.so.2"));
        let (_dir, path) = write_fixture(&image);
        let dir = read_interp_dir(&path).expect("should find interp dir");
        assert_eq!(dir, PathBuf::from("/lib64"));
    }

    #[test]
    fn interp_dir_of_32bit_binary() {
        let image = build_elf(ElfClass::Elf32, 3, Some("/lib/ld-linux.so.2"));
        let (_dir, path) = write_fixture(&image);
        let dir = read_interp_dir(&path).expect("should find interp dir");
        assert_eq!(dir, PathBuf::from("/lib"));
    }

    #[test]
    fn interp_dir_absent_for_static_binary() {
        let (_dir, path) = write_fixture(&build_elf(ElfClass::Elf64, 62, None));
        assert!(read_interp_dir(&path).is_none());
    }

    #[test]
    fn interp_dir_fails_on_truncated_segment() {
        let image = build_elf(ElfClass::Elf64, 62, Some("/lib64/ld-linux-x86-64.so.2"));
        // Cut the file inside the interpreter string.
        let (_dir, path) = write_fixture(&image[..image.len() - 10]);
        assert!(read_interp_dir(&path).is_none());
    }

    #[test]
    fn interp_dir_fails_on_non_elf() {
        let (_dir, path) = write_fixture(b"not an elf at all");
        assert!(read_interp_dir(&path).is_none());
    }
}
