//! Shadow record of the guest's live call activations.
//!
//! Every CALL pushes a frame describing the callee (symbol, entry, return
//! address, frame pointer, wall-clock entry time); every RET pops one. The
//! recorder is independent of the guest's own stack layout, so a renderer
//! can show `symbol+offset` backtraces even when the guest corrupts its
//! stack. Storage grows in fixed increments and is retained across pops.
//!
//! The recorder owns the symbol resolver. A small most-recently-used ring
//! of lookup results takes the sting out of tight call loops; control flow
//! has enough temporal locality that the ring needs no eviction policy
//! beyond overwrite-in-order.

use std::time::SystemTime;

use strato_symbols::{SymbolHit, SymbolResolver};

const BACKTRACE_GROWTH: usize = 32;
const LOOKUP_CACHE_SIZE: usize = 10;

/// One live activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceRecord {
    /// Callee symbol, when the resolver knows one.
    pub symbol: Option<Box<str>>,
    /// Symbol entry address (or the raw call target when unresolved).
    pub start: u32,
    /// End of the symbol's extent.
    pub end: u32,
    /// Current EIP relative to `start`; kept fresh by `current_eip_set`.
    pub rel: u32,
    /// Address execution resumes at after the matching RET.
    pub ret: u32,
    /// Frame pointer at entry.
    pub frame: u32,
    /// Wall-clock time the activation started.
    pub entered: SystemTime,
}

#[derive(Debug, Clone)]
struct CachedSym {
    name: Option<Box<str>>,
    start: u32,
    size: u32,
}

/// Bounded backtrace of in-flight activations.
#[derive(Debug)]
pub struct CallTrace {
    resolver: SymbolResolver,
    records: Vec<TraceRecord>,
    /// Logical depth; `records[..top]` are live. Popped storage is kept.
    top: usize,
    cache: Vec<CachedSym>,
    cache_w: usize,
}

impl CallTrace {
    pub fn new(resolver: SymbolResolver) -> CallTrace {
        CallTrace {
            resolver,
            records: Vec::with_capacity(BACKTRACE_GROWTH),
            top: 0,
            cache: Vec::with_capacity(LOOKUP_CACHE_SIZE),
            cache_w: 0,
        }
    }

    pub fn resolver(&self) -> &SymbolResolver {
        &self.resolver
    }

    /// Record a CALL to `target`, returning to `ret`, with frame pointer
    /// `frame`. `scan` is handed through to the resolver for lazy extent
    /// refinement (pass `|_, _| None` when no decoder is at hand).
    pub fn push(
        &mut self,
        target: u32,
        ret: u32,
        frame: u32,
        scan: impl FnOnce(u32, u32) -> Option<u32>,
    ) {
        let cached = self.cache_lookup(target);
        let sym = match cached {
            Some(c) => c,
            None => {
                let hit = self.resolver.lookup_with_scan(target, scan);
                let c = match hit {
                    Some(SymbolHit { name, start, size }) => CachedSym {
                        name: name.map(Box::from),
                        start,
                        size,
                    },
                    None => CachedSym {
                        name: None,
                        start: target,
                        size: 0,
                    },
                };
                if c.name.is_some() {
                    self.cache_insert(c.clone());
                }
                c
            }
        };

        let record = TraceRecord {
            symbol: sym.name,
            start: sym.start,
            end: sym.start + sym.size,
            rel: target - sym.start,
            ret,
            frame,
            entered: SystemTime::now(),
        };

        if self.top == self.records.len() {
            if self.records.len() == self.records.capacity() {
                self.records.reserve(BACKTRACE_GROWTH);
            }
            self.records.push(record);
        } else {
            self.records[self.top] = record;
        }
        self.top += 1;
    }

    /// Record a RET. Popping an empty trace is a no-op; the guest can RET
    /// past the frames we saw it create.
    pub fn pop(&mut self) {
        self.top = self.top.saturating_sub(1);
    }

    /// Update the top record's relative offset after a non-control-flow
    /// instruction, so renderers show the current `symbol+offset`.
    pub fn current_eip_set(&mut self, eip: u32) {
        if self.top > 0 {
            let rec = &mut self.records[self.top - 1];
            rec.rel = eip.wrapping_sub(rec.start);
        }
    }

    pub fn len(&self) -> usize {
        self.top
    }

    pub fn is_empty(&self) -> bool {
        self.top == 0
    }

    pub fn top(&self) -> Option<&TraceRecord> {
        self.top.checked_sub(1).map(|i| &self.records[i])
    }

    pub fn at(&self, i: usize) -> Option<&TraceRecord> {
        (i < self.top).then(|| &self.records[i])
    }

    /// Live records, outermost first.
    pub fn iter(&self) -> impl Iterator<Item = &TraceRecord> {
        self.records[..self.top].iter()
    }

    fn cache_lookup(&self, target: u32) -> Option<CachedSym> {
        self.cache
            .iter()
            .find(|c| target >= c.start && target < c.start + c.size)
            .cloned()
    }

    fn cache_insert(&mut self, sym: CachedSym) {
        if self.cache.len() < LOOKUP_CACHE_SIZE {
            self.cache.push(sym);
        } else {
            self.cache[self.cache_w] = sym;
        }
        self.cache_w = (self.cache_w + 1) % LOOKUP_CACHE_SIZE;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_trace() -> CallTrace {
        // A resolver over a bare ELF header resolves nothing, which is all
        // these tests need.
        let f = minimal_elf();
        CallTrace::new(SymbolResolver::load(f.path()).expect("load"))
    }

    fn minimal_elf() -> tempfile::NamedTempFile {
        use std::io::Write;
        // Minimal ELF header with no sections and no program headers.
        let mut out = vec![0x7f, b'E', b'L', b'F', 1, 1, 1, 0];
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&[2, 0, 3, 0]);
        out.extend_from_slice(&1u32.to_le_bytes());
        out.extend_from_slice(&[0u8; 28]);
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&out).unwrap();
        f
    }

    #[test]
    fn push_pop_depth_round_trips() {
        let mut trace = empty_trace();
        let before = trace.len();
        trace.push(0x0804_8400, 0x0804_8123, 0x7fff_3000, |_, _| None);
        trace.push(0x0804_8600, 0x0804_8456, 0x7fff_2f00, |_, _| None);
        assert_eq!(trace.len(), before + 2);
        trace.pop();
        trace.pop();
        assert_eq!(trace.len(), before);
    }

    #[test]
    fn pop_of_an_empty_trace_is_harmless() {
        let mut trace = empty_trace();
        trace.pop();
        assert_eq!(trace.len(), 0);
        assert!(trace.top().is_none());
    }

    #[test]
    fn unresolved_targets_still_record_the_raw_address() {
        let mut trace = empty_trace();
        trace.push(0x0804_9000, 0x0804_8005, 0x7fff_3ff0, |_, _| None);

        let top = trace.top().expect("top");
        assert_eq!(top.symbol, None);
        assert_eq!(top.start, 0x0804_9000);
        assert_eq!(top.rel, 0);
        assert_eq!(top.ret, 0x0804_8005);
        assert_eq!(top.frame, 0x7fff_3ff0);
    }

    #[test]
    fn current_eip_tracks_the_top_record() {
        let mut trace = empty_trace();
        trace.push(0x0804_9000, 0x0804_8005, 0, |_, _| None);
        trace.current_eip_set(0x0804_9024);
        assert_eq!(trace.top().unwrap().rel, 0x24);
    }

    #[test]
    fn storage_is_retained_across_pops() {
        let mut trace = empty_trace();
        for i in 0..40u32 {
            trace.push(0x0804_9000 + i, 0, 0, |_, _| None);
        }
        for _ in 0..40 {
            trace.pop();
        }
        assert!(trace.is_empty());
        // Push after a deep pop reuses a retained slot.
        trace.push(0x0804_9000, 0, 0, |_, _| None);
        assert_eq!(trace.len(), 1);
        assert_eq!(trace.at(0).unwrap().start, 0x0804_9000);
    }
}
