//! Binary rule set: a single little-endian buffer holding every table the
//! matcher reads at runtime.
//!
//! ```text
//! header (88 bytes)
//!   magic "GRMS" | version | flags | nonterminal count
//!   (offset, len) for: terminals, strings, lhs records, lhs sets, shards,
//!   predefined, filters, annotations, debug names
//! terminal pool      sorted, deduplicated, NUL separated
//! string pool        locale tags, annotation names, debug names
//! lhs records        nonterminal u32 | callback u32 | param u64 | gap i32
//! lhs set directory  (entries offset, len); entries are i32:
//!                      >= 0  plain nonterminal
//!                      <  0  -(record index + 1)
//! shard records      locales | cs terminals | ci terminals | unary | binary
//! ```
//!
//! Terminal and unary tables are sorted for binary search. Binary rules are
//! hashed into a power-of-two number of buckets keyed on `(rhs1, rhs2)`.
//!
//! [`RulesSet::from_bytes`] verifies every offset and cross reference once, so
//! lookups afterwards only use checked slicing and never panic on a corrupt
//! buffer that passed verification.

use super::ir::{Callback, Ir, Lhs};
use crate::error::RulesSetError;
use crate::{CallbackId, Locale, MAX_DIGITS_NONTERM, Nonterm, UNASSIGNED_NONTERM};
use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

const MAGIC: [u8; 4] = *b"GRMS";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 88;
const LHS_RECORD_LEN: usize = 20;
const PREDEFINED_LEN: usize = (5 + MAX_DIGITS_NONTERM + 1) * 4;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct RulesSetFlags: u32 {
        const DEBUG_INFORMATION = 1 << 0;
    }
}

/// Nonterminals the lexer emits on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PredefinedNonterminals {
    pub start: Nonterm,
    pub end: Nonterm,
    pub token: Nonterm,
    pub uppercase_token: Nonterm,
    pub digits: Nonterm,
    /// `n_digits[n]` is `<n_digits>`; index 0 is unused.
    pub n_digits: [Nonterm; MAX_DIGITS_NONTERM + 1],
}

impl PredefinedNonterminals {
    pub fn n_digits(&self, n: usize) -> Nonterm {
        self.n_digits.get(n).copied().unwrap_or(UNASSIGNED_NONTERM)
    }

    fn as_array(&self) -> [Nonterm; 5 + MAX_DIGITS_NONTERM + 1] {
        let mut out = [UNASSIGNED_NONTERM; 5 + MAX_DIGITS_NONTERM + 1];
        out[0] = self.start;
        out[1] = self.end;
        out[2] = self.token;
        out[3] = self.uppercase_token;
        out[4] = self.digits;
        out[5..].copy_from_slice(&self.n_digits);
        out
    }
}

/// Index of an lhs set inside a [`RulesSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LhsSetId(u32);

#[derive(Debug, Clone, Copy, Default)]
struct Table {
    offset: usize,
    count: usize,
}

#[derive(Debug, Clone, Default)]
struct ShardLayout {
    locales: Vec<Locale>,
    cs_terminals: Table,
    ci_terminals: Table,
    unary: Table,
    buckets: Table,
    binary: Table,
}

#[derive(Debug, Default)]
struct Layout {
    flags: RulesSetFlags,
    nonterminal_count: u32,
    terminals: Table,
    strings: Table,
    lhs: Table,
    lhs_sets: Table,
    shards: Vec<ShardLayout>,
    predefined: PredefinedNonterminals,
    filters: Table,
    annotations: Table,
    debug: Table,
}

/// Verified, immutable, cheaply clonable rule set.
#[derive(Debug, Clone)]
pub struct RulesSet {
    buf: Bytes,
    layout: Arc<Layout>,
}

fn u32_at(buf: &[u8], offset: usize) -> Option<u32> {
    let mut slice = buf.get(offset..offset.checked_add(4)?)?;
    Some(slice.get_u32_le())
}

fn i32_at(buf: &[u8], offset: usize) -> Option<i32> {
    let mut slice = buf.get(offset..offset.checked_add(4)?)?;
    Some(slice.get_i32_le())
}

fn u64_at(buf: &[u8], offset: usize) -> Option<u64> {
    let mut slice = buf.get(offset..offset.checked_add(8)?)?;
    Some(slice.get_u64_le())
}

fn binary_bucket(rhs1: Nonterm, rhs2: Nonterm, bucket_count: usize) -> usize {
    let key = ((rhs1 as u64) << 32) | rhs2 as u64;
    let hash = key.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    ((hash >> 32) as usize) & (bucket_count.max(1) - 1)
}

impl RulesSet {
    /// Load and verify a serialized rule set.
    pub fn from_bytes(buf: impl Into<Bytes>) -> Result<Self, RulesSetError> {
        let buf = buf.into();
        let layout = Verifier { buf: &buf }.verify()?;
        tracing::debug!(
            bytes = buf.len(),
            shards = layout.shards.len(),
            nonterminals = layout.nonterminal_count,
            "loaded rules set"
        );
        Ok(RulesSet { buf, layout: Arc::new(layout) })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn nonterminal_count(&self) -> u32 {
        self.layout.nonterminal_count
    }

    pub fn has_debug_information(&self) -> bool {
        self.layout.flags.contains(RulesSetFlags::DEBUG_INFORMATION)
    }

    pub fn shard_count(&self) -> usize {
        self.layout.shards.len()
    }

    pub fn shard_locales(&self, shard: usize) -> &[Locale] {
        self.layout.shards.get(shard).map(|s| s.locales.as_slice()).unwrap_or(&[])
    }

    /// Shards whose locales support `locales`, in declaration order.
    pub fn select_shards(&self, locales: &[Locale]) -> Vec<usize> {
        (0..self.shard_count())
            .filter(|&shard| crate::is_locale_supported(self.shard_locales(shard), locales))
            .collect()
    }

    pub fn predefined(&self) -> &PredefinedNonterminals {
        &self.layout.predefined
    }

    pub fn is_filter(&self, callback: CallbackId) -> bool {
        let table = self.layout.filters;
        self.search(table, 4, |offset| u32_at(&self.buf, offset).map(|id| id.cmp(&callback))).is_some()
    }

    pub fn annotation_nonterminal(&self, name: &str) -> Option<Nonterm> {
        let table = self.layout.annotations;
        let offset = self.search(table, 8, |offset| {
            let name_off = u32_at(&self.buf, offset)?;
            Some(self.string(name_off)?.cmp(name))
        })?;
        u32_at(&self.buf, offset + 4)
    }

    /// Human-readable name of a nonterminal, when debug information was kept.
    pub fn debug_name(&self, nonterminal: Nonterm) -> Option<&str> {
        let table = self.layout.debug;
        let offset = self.search(table, 8, |offset| u32_at(&self.buf, offset).map(|nt| nt.cmp(&nonterminal)))?;
        self.string(u32_at(&self.buf, offset + 4)?)
    }

    /// Every interned terminal, in sorted order.
    pub fn terminals(&self) -> impl Iterator<Item = &str> + '_ {
        let pool = self.section(self.layout.terminals);
        pool.split(|&b| b == 0).filter(|s| !s.is_empty()).filter_map(|s| std::str::from_utf8(s).ok())
    }

    /// Look up a terminal in the case sensitive table, or, with
    /// `case_sensitive == false`, the already lowercased text in the case
    /// insensitive table.
    pub fn find_terminal(&self, shard: usize, text: &str, case_sensitive: bool) -> Option<LhsSetId> {
        let layout = self.layout.shards.get(shard)?;
        let table = if case_sensitive { layout.cs_terminals } else { layout.ci_terminals };
        let offset = self.search(table, 8, |offset| {
            let term_off = u32_at(&self.buf, offset)?;
            Some(self.terminal(term_off)?.cmp(text))
        })?;
        u32_at(&self.buf, offset + 4).map(LhsSetId)
    }

    pub fn find_unary(&self, shard: usize, rhs: Nonterm) -> Option<LhsSetId> {
        let table = self.layout.shards.get(shard)?.unary;
        let offset = self.search(table, 8, |offset| u32_at(&self.buf, offset).map(|nt| nt.cmp(&rhs)))?;
        u32_at(&self.buf, offset + 4).map(LhsSetId)
    }

    pub fn find_binary(&self, shard: usize, rhs1: Nonterm, rhs2: Nonterm) -> Option<LhsSetId> {
        let layout = self.layout.shards.get(shard)?;
        if layout.binary.count == 0 {
            return None;
        }
        let bucket = binary_bucket(rhs1, rhs2, layout.buckets.count);
        let bucket_off = layout.buckets.offset + bucket * 8;
        let start = u32_at(&self.buf, bucket_off)? as usize;
        let len = u32_at(&self.buf, bucket_off + 4)? as usize;
        (start..start + len).find_map(|i| {
            let offset = layout.binary.offset + i * 12;
            let found = u32_at(&self.buf, offset)? == rhs1 && u32_at(&self.buf, offset + 4)? == rhs2;
            if found { u32_at(&self.buf, offset + 8).map(LhsSetId) } else { None }
        })
    }

    /// Decode the entries of an lhs set.
    pub fn lhs_set(&self, set: LhsSetId) -> impl Iterator<Item = Lhs> + '_ {
        let dir = self.layout.lhs_sets.offset + set.0 as usize * 8;
        let start = u32_at(&self.buf, dir).unwrap_or(0) as usize;
        let len = if (set.0 as usize) < self.layout.lhs_sets.count { u32_at(&self.buf, dir + 4).unwrap_or(0) } else { 0 };
        (0..len as usize).filter_map(move |i| self.decode_lhs(i32_at(&self.buf, start + i * 4)?))
    }

    fn decode_lhs(&self, entry: i32) -> Option<Lhs> {
        if entry >= 0 {
            return Some(Lhs::plain(entry as Nonterm));
        }
        let index = (-(entry as i64) - 1) as usize;
        let offset = self.layout.lhs.offset + index * LHS_RECORD_LEN;
        Some(Lhs {
            nonterminal: u32_at(&self.buf, offset)?,
            callback: Callback { id: u32_at(&self.buf, offset + 4)?, param: u64_at(&self.buf, offset + 8)? },
            max_whitespace_gap: i32_at(&self.buf, offset + 16)?.clamp(-1, i8::MAX as i32) as i8,
        })
    }

    fn section(&self, table: Table) -> &[u8] {
        self.buf.get(table.offset..table.offset + table.count).unwrap_or(&[])
    }

    fn terminal(&self, offset: u32) -> Option<&str> {
        pool_str(self.section(self.layout.terminals), offset as usize)
    }

    fn string(&self, offset: u32) -> Option<&str> {
        pool_str(self.section(self.layout.strings), offset as usize)
    }

    /// Binary search over fixed-size records; returns the record offset.
    fn search(
        &self,
        table: Table,
        record_len: usize,
        cmp: impl Fn(usize) -> Option<std::cmp::Ordering>,
    ) -> Option<usize> {
        let (mut lo, mut hi) = (0, table.count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let offset = table.offset + mid * record_len;
            match cmp(offset)? {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Some(offset),
            }
        }
        None
    }
}

fn pool_str(pool: &[u8], offset: usize) -> Option<&str> {
    let tail = pool.get(offset..)?;
    let end = tail.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&tail[..end]).ok()
}

struct Verifier<'a> {
    buf: &'a [u8],
}

impl Verifier<'_> {
    fn header(&self, field: usize) -> u32 {
        u32_at(self.buf, field).unwrap_or(0)
    }

    fn range(&self, section: &'static str, offset: usize, len: usize) -> Result<(), RulesSetError> {
        match offset.checked_add(len) {
            Some(end) if end <= self.buf.len() => Ok(()),
            _ => Err(RulesSetError::OutOfBounds { section, offset, len, buffer: self.buf.len() }),
        }
    }

    fn table(&self, section: &'static str, field: usize, record_len: usize) -> Result<Table, RulesSetError> {
        let offset = self.header(field) as usize;
        let count = self.header(field + 4) as usize;
        let len = count.checked_mul(record_len).unwrap_or(usize::MAX);
        self.range(section, offset, len)?;
        Ok(Table { offset, count })
    }

    fn check(section: &'static str, index: u64, limit: u64) -> Result<(), RulesSetError> {
        if index < limit { Ok(()) } else { Err(RulesSetError::DanglingReference { section, index, limit }) }
    }

    fn read(&self, section: &'static str, offset: usize) -> Result<u32, RulesSetError> {
        u32_at(self.buf, offset).ok_or(RulesSetError::OutOfBounds { section, offset, len: 4, buffer: self.buf.len() })
    }

    fn pool_string<'p>(&self, pool: &'p [u8], offset: u32) -> Result<&'p str, RulesSetError> {
        pool_str(pool, offset as usize).ok_or(RulesSetError::BadString(offset as usize))
    }

    fn verify(&self) -> Result<Layout, RulesSetError> {
        if self.buf.len() < HEADER_LEN {
            return Err(RulesSetError::TooShort(self.buf.len()));
        }
        let magic = [self.buf[0], self.buf[1], self.buf[2], self.buf[3]];
        if magic != MAGIC {
            return Err(RulesSetError::BadMagic(magic));
        }
        let version = self.header(4);
        if version != VERSION {
            return Err(RulesSetError::UnsupportedVersion(version));
        }

        let mut layout = Layout {
            flags: RulesSetFlags::from_bits_truncate(self.header(8)),
            nonterminal_count: self.header(12),
            terminals: self.table("terminals", 16, 1)?,
            strings: self.table("strings", 24, 1)?,
            lhs: self.table("lhs records", 32, LHS_RECORD_LEN)?,
            lhs_sets: self.table("lhs sets", 40, 8)?,
            filters: self.table("filters", 60, 4)?,
            annotations: self.table("annotations", 68, 8)?,
            debug: self.table("debug names", 76, 8)?,
            ..Layout::default()
        };
        let terminals = &self.buf[layout.terminals.offset..layout.terminals.offset + layout.terminals.count];
        let strings = &self.buf[layout.strings.offset..layout.strings.offset + layout.strings.count];
        let max_nonterm = layout.nonterminal_count as u64 + 1;

        for i in 0..layout.lhs.count {
            let nonterminal = self.read("lhs records", layout.lhs.offset + i * LHS_RECORD_LEN)?;
            Self::check("lhs records", nonterminal as u64, max_nonterm)?;
        }
        for i in 0..layout.lhs_sets.count {
            let dir = layout.lhs_sets.offset + i * 8;
            let start = self.read("lhs sets", dir)? as usize;
            let len = self.read("lhs sets", dir + 4)? as usize;
            self.range("lhs set entries", start, len.saturating_mul(4))?;
            for j in 0..len {
                let entry = i32_at(self.buf, start + j * 4).unwrap_or(0);
                if entry >= 0 {
                    Self::check("lhs set entries", entry as u64, max_nonterm)?;
                } else {
                    Self::check("lhs set entries", (-(entry as i64) - 1) as u64, layout.lhs.count as u64)?;
                }
            }
        }

        let predefined_off = self.header(56) as usize;
        self.range("predefined", predefined_off, PREDEFINED_LEN)?;
        let mut predefined = [UNASSIGNED_NONTERM; 5 + MAX_DIGITS_NONTERM + 1];
        for (i, slot) in predefined.iter_mut().enumerate() {
            *slot = self.read("predefined", predefined_off + i * 4)?;
            Self::check("predefined", *slot as u64, max_nonterm)?;
        }
        layout.predefined = PredefinedNonterminals {
            start: predefined[0],
            end: predefined[1],
            token: predefined[2],
            uppercase_token: predefined[3],
            digits: predefined[4],
            n_digits: {
                let mut n = [UNASSIGNED_NONTERM; MAX_DIGITS_NONTERM + 1];
                n.copy_from_slice(&predefined[5..]);
                n
            },
        };

        for i in 0..layout.annotations.count {
            let offset = layout.annotations.offset + i * 8;
            self.pool_string(strings, self.read("annotations", offset)?)?;
            Self::check("annotations", self.read("annotations", offset + 4)? as u64, max_nonterm)?;
        }
        for i in 0..layout.debug.count {
            let offset = layout.debug.offset + i * 8;
            self.pool_string(strings, self.read("debug names", offset + 4)?)?;
        }

        let shard_table = self.table("shards", 48, 4)?;
        for shard in 0..shard_table.count {
            let offset = self.read("shards", shard_table.offset + shard * 4)? as usize;
            layout.shards.push(self.verify_shard(shard, offset, terminals, strings, &layout)?);
        }
        Ok(layout)
    }

    fn verify_shard(
        &self,
        shard: usize,
        mut offset: usize,
        terminals: &[u8],
        strings: &[u8],
        layout: &Layout,
    ) -> Result<ShardLayout, RulesSetError> {
        let mut table = |section: &'static str, record_len: usize| -> Result<Table, RulesSetError> {
            let count = self.read(section, offset)? as usize;
            let table = Table { offset: offset + 4, count };
            self.range(section, table.offset, count.saturating_mul(record_len))?;
            offset = table.offset + count * record_len;
            Ok(table)
        };

        let locale_table = table("shard locales", 4)?;
        let cs_terminals = table("case sensitive terminals", 8)?;
        let ci_terminals = table("case insensitive terminals", 8)?;
        let unary = table("unary rules", 8)?;
        let buckets = table("binary buckets", 8)?;
        let binary = table("binary rules", 12)?;

        let mut locales = Vec::with_capacity(locale_table.count);
        for i in 0..locale_table.count {
            let tag = self.pool_string(strings, self.read("shard locales", locale_table.offset + i * 4)?)?;
            locales.push(tag.parse::<Locale>().map_err(|source| RulesSetError::BadLocale { shard, source })?);
        }

        let sets = layout.lhs_sets.count as u64;
        for (section, t) in [("case sensitive terminals", cs_terminals), ("case insensitive terminals", ci_terminals)] {
            for i in 0..t.count {
                self.pool_string(terminals, self.read(section, t.offset + i * 8)?)?;
                Self::check(section, self.read(section, t.offset + i * 8 + 4)? as u64, sets)?;
            }
        }
        for i in 0..unary.count {
            Self::check("unary rules", self.read("unary rules", unary.offset + i * 8 + 4)? as u64, sets)?;
        }
        if binary.count > 0 && !buckets.count.is_power_of_two() {
            return Err(RulesSetError::DanglingReference {
                section: "binary buckets",
                index: buckets.count as u64,
                limit: buckets.count.next_power_of_two() as u64,
            });
        }
        for i in 0..buckets.count {
            let start = self.read("binary buckets", buckets.offset + i * 8)? as u64;
            let len = self.read("binary buckets", buckets.offset + i * 8 + 4)? as u64;
            Self::check("binary buckets", start + len, binary.count as u64 + 1)?;
        }
        for i in 0..binary.count {
            Self::check("binary rules", self.read("binary rules", binary.offset + i * 12 + 8)? as u64, sets)?;
        }

        Ok(ShardLayout { locales, cs_terminals, ci_terminals, unary, buckets, binary })
    }
}

/// Interning pools used while writing.
#[derive(Default)]
struct Pools {
    lhs_records: Vec<Lhs>,
    lhs_index: HashMap<(Nonterm, CallbackId, u64, i8), usize>,
    sets: Vec<Vec<i32>>,
    set_index: HashMap<Vec<i32>, u32>,
}

impl Pools {
    fn intern_set(&mut self, set: &[Lhs]) -> u32 {
        let entries: Vec<i32> = set
            .iter()
            .map(|lhs| {
                if lhs.is_plain() {
                    return lhs.nonterminal as i32;
                }
                let key = (lhs.nonterminal, lhs.callback.id, lhs.callback.param, lhs.max_whitespace_gap);
                let index = *self.lhs_index.entry(key).or_insert_with(|| {
                    self.lhs_records.push(*lhs);
                    self.lhs_records.len() - 1
                });
                -(index as i32) - 1
            })
            .collect();
        if let Some(&id) = self.set_index.get(&entries) {
            return id;
        }
        let id = self.sets.len() as u32;
        self.sets.push(entries.clone());
        self.set_index.insert(entries, id);
        id
    }
}

fn build_pool<'a>(strings: impl IntoIterator<Item = &'a str>) -> (Vec<u8>, BTreeMap<&'a str, u32>) {
    let sorted: BTreeSet<&str> = strings.into_iter().collect();
    let mut pool = Vec::new();
    let mut offsets = BTreeMap::new();
    for s in sorted {
        offsets.insert(s, pool.len() as u32);
        pool.extend_from_slice(s.as_bytes());
        pool.push(0);
    }
    (pool, offsets)
}

pub(crate) fn write_rules_set(ir: &Ir, include_debug_information: bool) -> Vec<u8> {
    let shards = ir.shards();

    let (terminal_pool, terminal_offsets) = build_pool(
        shards.iter().flat_map(|s| s.terminal_rules.keys().chain(s.lowercase_terminal_rules.keys()).map(String::as_str)),
    );

    let locale_tags: Vec<Vec<String>> =
        ir.shard_locales().iter().map(|ls| ls.iter().map(ToString::to_string).collect()).collect();
    let mut pooled: Vec<&str> = locale_tags.iter().flatten().map(String::as_str).collect();
    pooled.extend(ir.annotations().keys().map(String::as_str));
    if include_debug_information {
        pooled.extend(ir.names().values().map(String::as_str));
    }
    let (string_pool, string_offsets) = build_pool(pooled);
    let string_off = |s: &str| string_offsets.get(s).copied().unwrap_or(0);

    let mut pools = Pools::default();
    let mut shard_records = Vec::with_capacity(shards.len());
    for (index, shard) in shards.iter().enumerate() {
        let mut record = Vec::new();
        record.put_u32_le(locale_tags[index].len() as u32);
        for tag in &locale_tags[index] {
            record.put_u32_le(string_off(tag));
        }
        for table in [&shard.terminal_rules, &shard.lowercase_terminal_rules] {
            record.put_u32_le(table.len() as u32);
            for (terminal, set) in table {
                record.put_u32_le(terminal_offsets.get(terminal.as_str()).copied().unwrap_or(0));
                record.put_u32_le(pools.intern_set(set));
            }
        }
        record.put_u32_le(shard.unary_rules.len() as u32);
        for (rhs, set) in &shard.unary_rules {
            record.put_u32_le(*rhs);
            record.put_u32_le(pools.intern_set(set));
        }

        let bucket_count = shard.binary_rules.len().max(1).next_power_of_two();
        let mut buckets: Vec<Vec<(Nonterm, Nonterm, u32)>> = vec![Vec::new(); bucket_count];
        for (&(rhs1, rhs2), set) in &shard.binary_rules {
            let id = pools.intern_set(set);
            buckets[binary_bucket(rhs1, rhs2, bucket_count)].push((rhs1, rhs2, id));
        }
        record.put_u32_le(bucket_count as u32);
        let mut start = 0u32;
        for bucket in &buckets {
            record.put_u32_le(start);
            record.put_u32_le(bucket.len() as u32);
            start += bucket.len() as u32;
        }
        record.put_u32_le(shard.binary_rules.len() as u32);
        for (rhs1, rhs2, id) in buckets.iter().flatten() {
            record.put_u32_le(*rhs1);
            record.put_u32_le(*rhs2);
            record.put_u32_le(*id);
        }
        shard_records.push(record);
    }

    let mut out = vec![0u8; HEADER_LEN];
    let mut header: Vec<(usize, u32)> = Vec::new();
    let place = |out: &mut Vec<u8>, field: usize, bytes: &[u8], count: usize, header: &mut Vec<(usize, u32)>| {
        header.push((field, out.len() as u32));
        header.push((field + 4, count as u32));
        out.extend_from_slice(bytes);
    };

    place(&mut out, 16, &terminal_pool, terminal_pool.len(), &mut header);
    place(&mut out, 24, &string_pool, string_pool.len(), &mut header);

    let mut lhs_bytes = Vec::with_capacity(pools.lhs_records.len() * LHS_RECORD_LEN);
    for lhs in &pools.lhs_records {
        lhs_bytes.put_u32_le(lhs.nonterminal);
        lhs_bytes.put_u32_le(lhs.callback.id);
        lhs_bytes.put_u64_le(lhs.callback.param);
        lhs_bytes.put_i32_le(lhs.max_whitespace_gap as i32);
    }
    place(&mut out, 32, &lhs_bytes, pools.lhs_records.len(), &mut header);

    // Entries first, then the directory pointing at them.
    let mut directory = Vec::with_capacity(pools.sets.len() * 8);
    for set in &pools.sets {
        directory.put_u32_le(out.len() as u32);
        directory.put_u32_le(set.len() as u32);
        for entry in set {
            out.put_i32_le(*entry);
        }
    }
    place(&mut out, 40, &directory, pools.sets.len(), &mut header);

    let mut shard_offsets = Vec::with_capacity(shard_records.len() * 4);
    for record in &shard_records {
        shard_offsets.put_u32_le(out.len() as u32);
        out.extend_from_slice(record);
    }
    place(&mut out, 48, &shard_offsets, shard_records.len(), &mut header);

    header.push((56, out.len() as u32));
    for nonterminal in ir.predefined().as_array() {
        out.put_u32_le(nonterminal);
    }

    let mut filters = Vec::new();
    for id in ir.filters() {
        filters.put_u32_le(*id);
    }
    place(&mut out, 60, &filters, ir.filters().len(), &mut header);

    let mut annotations = Vec::new();
    for (name, nonterminal) in ir.annotations() {
        annotations.put_u32_le(string_off(name));
        annotations.put_u32_le(*nonterminal);
    }
    place(&mut out, 68, &annotations, ir.annotations().len(), &mut header);

    let mut debug = Vec::new();
    let mut debug_count = 0;
    if include_debug_information {
        for (nonterminal, name) in ir.names() {
            debug.put_u32_le(*nonterminal);
            debug.put_u32_le(string_off(name));
            debug_count += 1;
        }
    }
    place(&mut out, 76, &debug, debug_count, &mut header);

    let mut flags = RulesSetFlags::empty();
    flags.set(RulesSetFlags::DEBUG_INFORMATION, include_debug_information);

    out[0..4].copy_from_slice(&MAGIC);
    out[4..8].copy_from_slice(&VERSION.to_le_bytes());
    out[8..12].copy_from_slice(&flags.bits().to_le_bytes());
    out[12..16].copy_from_slice(&ir.nonterminal_count().to_le_bytes());
    for (field, value) in header {
        out[field..field + 4].copy_from_slice(&value.to_le_bytes());
    }
    out
}
