//! Address-to-symbol resolver over a three-level region/zone/record index.
//!
//! A region is one `PT_LOAD` segment of the executable, rounded up to whole
//! pages. Each region is divided into zones of one host page; each zone
//! holds its symbol records sorted by offset-in-zone, with a cached midpoint
//! so a lookup scans at most one half. A symbol spanning into later pages is
//! present only in its starting zone; lookups landing in an empty zone walk
//! backward to the nearest populated one and take its last record.
//!
//! The resolver owns its own file handle, independent of the emulated
//! memory image. Symbol names are not materialized at build time: a record
//! stores only the string-table file offset, and the first lookup that
//! reports the symbol reads the NUL-terminated name and keeps it for the
//! resolver's lifetime.

use std::cell::{Cell, OnceCell};
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;

use thiserror::Error;

const SHT_SYMTAB: u32 = 2;
const SHT_DYNSYM: u32 = 11;
const PT_LOAD: u32 = 1;
const STT_OBJECT: u8 = 1;
const STT_FUNC: u8 = 2;

/// Spans longer than this are not trusted from the symbol table alone; the
/// extent may be refined by scanning the code (see
/// [`SymbolResolver::lookup_with_scan`]).
const EXTENT_SCAN_THRESHOLD: u32 = 200;

fn page_size() -> u32 {
    // SAFETY: sysconf is a pure query.
    let v = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if v <= 0 {
        4096
    } else {
        v as u32
    }
}

#[derive(Debug, Error)]
pub enum SymbolsError {
    #[error("reading symbols: {0}")]
    Io(#[from] io::Error),
    #[error("symbols: not a usable ELF file")]
    BadElf,
}

/// One symbol the lookup can land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolHit<'a> {
    pub name: Option<&'a str>,
    pub start: u32,
    pub size: u32,
}

#[derive(Debug)]
struct SymbolRecord {
    start: u32,
    /// `st_size`; zero when the symbol table does not carry one.
    size: u32,
    strtab_off: u64,
    name: OnceCell<String>,
    /// Extent refined by a code scan, once one has run.
    refined_end: Cell<Option<u32>>,
}

#[derive(Debug)]
struct ZoneRecord {
    off_in_zone: u16,
    /// End address of the symbol's extent (next symbol or `st_size`-based).
    end: u32,
    sym: usize,
}

#[derive(Debug, Default)]
struct Zone {
    base: u32,
    records: Vec<ZoneRecord>,
    /// Midpoint record index; kept at `n/2` whenever the count is even.
    mop: usize,
    /// Offset-in-zone of the midpoint record.
    divline: u16,
}

#[derive(Debug)]
struct Region {
    base: u32,
    end: u32,
    zones: Vec<Zone>,
}

#[derive(Debug)]
pub struct SymbolResolver {
    file: File,
    regions: Vec<Region>,
    symbols: Vec<SymbolRecord>,
    page: u32,
}

fn u16_at(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn u32_at(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

impl SymbolResolver {
    /// Open `path`, locate the preferred symbol table (`.symtab`, falling
    /// back to `.dynsym`), and build the region/zone index. An executable
    /// with no symbol table at all yields an empty resolver: every lookup
    /// misses.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<SymbolResolver, SymbolsError> {
        let file = File::open(path)?;

        let mut ehdr = [0u8; 52];
        file.read_exact_at(&mut ehdr, 0).map_err(|_| SymbolsError::BadElf)?;
        if ehdr[..4] != [0x7f, b'E', b'L', b'F'] {
            return Err(SymbolsError::BadElf);
        }

        let phoff = u32_at(&ehdr, 28) as u64;
        let shoff = u32_at(&ehdr, 32) as u64;
        let phentsize = u16_at(&ehdr, 42) as u64;
        let phnum = u16_at(&ehdr, 44);
        let shentsize = u16_at(&ehdr, 46) as u64;
        let shnum = u16_at(&ehdr, 48);

        let page = page_size();
        let mut resolver = SymbolResolver {
            file,
            regions: Vec::new(),
            symbols: Vec::new(),
            page,
        };

        resolver.create_regions(phoff, phnum, phentsize)?;

        if let Some((symtab_off, count, entsize, strtab_off)) =
            resolver.find_symtab(shoff, shnum, shentsize)?
        {
            resolver.collect_symbols(symtab_off, count, entsize, strtab_off)?;
        }

        resolver.index_symbols();
        Ok(resolver)
    }

    fn create_regions(&mut self, mut phoff: u64, phnum: u16, phentsize: u64) -> io::Result<()> {
        for _ in 0..phnum {
            let mut phdr = [0u8; 32];
            self.file.read_exact_at(&mut phdr, phoff)?;
            phoff += phentsize;

            if u32_at(&phdr, 0) != PT_LOAD {
                continue;
            }
            let vaddr = u32_at(&phdr, 8);
            let memsz = u32_at(&phdr, 20);
            let size = (memsz + self.page - 1) & !(self.page - 1);
            let nzones = (size / self.page) as usize;

            let mut zones = Vec::with_capacity(nzones);
            for i in 0..nzones {
                zones.push(Zone {
                    base: vaddr + i as u32 * self.page,
                    ..Zone::default()
                });
            }
            self.regions.push(Region {
                base: vaddr,
                end: vaddr + size,
                zones,
            });
        }
        Ok(())
    }

    /// Walk the section headers. `.symtab` wins over `.dynsym`; the linked
    /// string table comes along with whichever is chosen.
    fn find_symtab(
        &self,
        shoff: u64,
        shnum: u16,
        shentsize: u64,
    ) -> io::Result<Option<(u64, u32, u64, u64)>> {
        let mut symtab = None;
        let mut dynsym = None;

        let mut off = shoff;
        let mut headers = Vec::with_capacity(shnum as usize);
        for _ in 0..shnum {
            let mut shdr = [0u8; 40];
            self.file.read_exact_at(&mut shdr, off)?;
            off += shentsize;
            headers.push(shdr);
        }

        for shdr in &headers {
            let sh_type = u32_at(shdr, 4);
            if sh_type == SHT_SYMTAB && symtab.is_none() {
                symtab = Some(shdr);
            } else if sh_type == SHT_DYNSYM && dynsym.is_none() {
                dynsym = Some(shdr);
            }
        }

        let Some(shdr) = symtab.or(dynsym) else {
            return Ok(None);
        };

        let offset = u32_at(shdr, 16) as u64;
        let size = u32_at(shdr, 20);
        let link = u32_at(shdr, 24) as usize;
        let entsize = u32_at(shdr, 36).max(16) as u64;
        let count = size / entsize as u32;

        let strtab_off = headers
            .get(link)
            .map(|s| u32_at(s, 16) as u64)
            .unwrap_or(0);

        Ok(Some((offset, count, entsize, strtab_off)))
    }

    fn collect_symbols(
        &mut self,
        symtab_off: u64,
        count: u32,
        entsize: u64,
        strtab_off: u64,
    ) -> io::Result<()> {
        let mut off = symtab_off;
        for _ in 0..count {
            let mut sym = [0u8; 16];
            self.file.read_exact_at(&mut sym, off)?;
            off += entsize;

            let st_name = u32_at(&sym, 0);
            let st_value = u32_at(&sym, 4);
            let st_size = u32_at(&sym, 8);
            let st_type = sym[12] & 0xf;

            if st_value == 0 || (st_type != STT_FUNC && st_type != STT_OBJECT) {
                continue;
            }
            self.symbols.push(SymbolRecord {
                start: st_value,
                size: st_size,
                strtab_off: strtab_off + st_name as u64,
                name: OnceCell::new(),
                refined_end: Cell::new(None),
            });
        }
        Ok(())
    }

    /// Insert every collected symbol into its zone and fix up extents.
    fn index_symbols(&mut self) {
        // Insert in start order so next-symbol extents fall out of a single
        // forward walk afterwards.
        let page = self.page;
        let mut placed: Vec<(usize, u32)> = self
            .symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.start))
            .collect();
        placed.sort_by_key(|&(_, start)| start);

        for (idx, start) in placed.iter().copied() {
            let Some(region) = self
                .regions
                .iter_mut()
                .find(|r| start >= r.base && start < r.end)
            else {
                continue;
            };
            let zi = ((start - region.base) / page) as usize;
            let zone = &mut region.zones[zi];
            let off_in_zone = (start - zone.base) as u16;

            let pos = zone
                .records
                .iter()
                .position(|r| off_in_zone < r.off_in_zone)
                .unwrap_or(zone.records.len());
            zone.records.insert(
                pos,
                ZoneRecord {
                    off_in_zone,
                    end: 0,
                    sym: idx,
                },
            );

            let n = zone.records.len();
            if n % 2 == 0 {
                zone.mop = n / 2;
            }
            zone.divline = zone.records[zone.mop.min(n - 1)].off_in_zone;
        }

        // Extents: `st_size` when the table carries one, otherwise up to
        // the next symbol's start (region end for the last record).
        for region in &mut self.regions {
            let mut flat: Vec<(usize, usize)> = Vec::new();
            for (zi, zone) in region.zones.iter().enumerate() {
                for ri in 0..zone.records.len() {
                    flat.push((zi, ri));
                }
            }
            for w in 0..flat.len() {
                let next_start = if w + 1 < flat.len() {
                    let (zi, ri) = flat[w + 1];
                    region.zones[zi].base + region.zones[zi].records[ri].off_in_zone as u32
                } else {
                    region.end
                };
                let (zi, ri) = flat[w];
                let rec = &region.zones[zi].records[ri];
                let sym = &self.symbols[rec.sym];
                let end = if sym.size > 0 {
                    sym.start + sym.size
                } else {
                    next_start
                };
                region.zones[zi].records[ri].end = end;
            }
        }
    }

    fn find_region(&self, vaddr: u32) -> Option<&Region> {
        self.regions
            .iter()
            .find(|r| vaddr >= r.base && vaddr < r.end)
    }

    /// Last record at or before zone `zi`, walking backward over empty
    /// zones.
    fn last_record_upto<'r>(&self, region: &'r Region, zi: usize) -> Option<&'r ZoneRecord> {
        region.zones[..=zi]
            .iter()
            .rev()
            .find_map(|z| z.records.last())
    }

    fn materialize_name<'a>(&self, sym: &'a SymbolRecord) -> Option<&'a str> {
        if sym.name.get().is_none() {
            let mut bytes = Vec::new();
            let mut off = sym.strtab_off;
            loop {
                let mut b = [0u8; 1];
                if self.file.read_exact_at(&mut b, off).is_err() {
                    return None;
                }
                if b[0] == 0 {
                    break;
                }
                bytes.push(b[0]);
                off += 1;
            }
            let s = String::from_utf8_lossy(&bytes).into_owned();
            let _ = sym.name.set(s);
        }
        sym.name.get().map(|s| s.as_str())
    }

    fn hit<'s>(
        &'s self,
        rec: &ZoneRecord,
        scan: impl FnOnce(u32, u32) -> Option<u32>,
    ) -> SymbolHit<'s> {
        let sym = &self.symbols[rec.sym];
        let mut end = rec.end;

        // Long spans are usually "last symbol before a gap"; scanning the
        // code pins the real last instruction.
        if end - sym.start > EXTENT_SCAN_THRESHOLD {
            if let Some(refined) = sym.refined_end.get() {
                end = refined;
            } else if let Some(last) = scan(sym.start, end) {
                sym.refined_end.set(Some(last));
                end = last;
            }
        }

        SymbolHit {
            name: self.materialize_name(sym),
            start: sym.start,
            size: end - sym.start,
        }
    }

    /// Resolve `vaddr` to its enclosing symbol, or to the nearest preceding
    /// one when nothing encloses it.
    pub fn lookup(&self, vaddr: u32) -> Option<SymbolHit<'_>> {
        self.lookup_with_scan(vaddr, |_, _| None)
    }

    /// Like [`lookup`](Self::lookup), with a caller-supplied code scan used
    /// to refine suspiciously long extents. The scan receives
    /// `(symbol_start, span_end)` and returns the address of the last
    /// instruction before `span_end`, typically by decoding forward.
    pub fn lookup_with_scan(
        &self,
        vaddr: u32,
        scan: impl FnOnce(u32, u32) -> Option<u32>,
    ) -> Option<SymbolHit<'_>> {
        let region = self.find_region(vaddr)?;
        let zi = ((vaddr - region.base) / self.page) as usize;
        let zone = &region.zones[zi];
        let off_in_zone = (vaddr - zone.base) as u16;

        if zone.records.is_empty() {
            // A symbol whose span crosses pages lives only in its starting
            // zone; walk back to it.
            let rec = self.last_record_upto(region, zi)?;
            return Some(self.hit(rec, scan));
        }

        // The midpoint splits the zone; only one half needs scanning.
        let half: &[ZoneRecord] = if off_in_zone >= zone.divline {
            &zone.records[zone.mop.min(zone.records.len() - 1)..]
        } else {
            &zone.records[..zone.mop.min(zone.records.len())]
        };

        let best = half
            .iter()
            .filter(|r| r.off_in_zone <= off_in_zone)
            .last();

        match best {
            Some(rec) => Some(self.hit(rec, scan)),
            None => {
                // Before the first record of this zone: the enclosing
                // symbol starts in an earlier one.
                if zi == 0 {
                    return None;
                }
                let rec = self.last_record_upto(region, zi - 1)?;
                Some(self.hit(rec, scan))
            }
        }
    }

    /// Number of symbols in the index.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
