//! An editable overlay over original source text.
//!
//! Edits are recorded against original byte ranges and composed on demand into
//! final text plus a provenance-correct source map. Relocated ranges
//! (`move_range`) keep character-level mappings; untouched ranges map at chunk
//! and line starts. A span that survives into the output is always represented
//! by at least one mapped segment.
//!
//! Range edits (`update`/`remove`/`move_range`) must not overlap; recording an
//! overlapping range is a caller bug and panics immediately.

use serde::{Deserialize, Serialize};
use sourcemap::{SourceMap, SourceMapBuilder};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditKind {
    Update,
    Remove,
    Move { dest: u32 },
    InsertLeft,
    InsertRight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edit {
    pub start: u32,
    pub end: u32,
    pub kind: EditKind,
    pub text: String,
}

pub struct MapOptions {
    /// Output file name recorded in the map.
    pub file: Option<String>,
    /// Source name recorded in the map (usually the module id).
    pub source: String,
    pub include_content: bool,
}

impl MapOptions {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            file: None,
            source: source.into(),
            include_content: true,
        }
    }
}

#[derive(Debug)]
pub struct SourceOverlay {
    source: String,
    line_starts: Vec<u32>,
    edits: Vec<Edit>,
}

enum Piece<'a> {
    Slice { start: u32, end: u32, moved: bool },
    Text { text: &'a str, anchor: Option<u32> },
}

#[derive(Default)]
struct InsertGroup {
    lefts: Vec<usize>,
    rights: Vec<RightPiece>,
}

enum RightPiece {
    Text(usize),
    Moved { start: u32, end: u32 },
}

impl SourceOverlay {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let mut line_starts = vec![0u32];
        for (idx, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(idx as u32 + 1);
            }
        }
        Self {
            source,
            line_starts,
            edits: Vec::new(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn is_pristine(&self) -> bool {
        self.edits.is_empty()
    }

    /// Replace `[start, end)` with `text`. The replacement keeps provenance to
    /// the start of the replaced range.
    pub fn update(&mut self, start: u32, end: u32, text: impl Into<String>) {
        self.check_range(start, end);
        self.edits.push(Edit {
            start,
            end,
            kind: EditKind::Update,
            text: text.into(),
        });
    }

    pub fn remove(&mut self, start: u32, end: u32) {
        self.check_range(start, end);
        self.edits.push(Edit {
            start,
            end,
            kind: EditKind::Remove,
            text: String::new(),
        });
    }

    /// Excise `[start, end)` and re-emit it at `dest` (an offset into the
    /// original text; pieces queued at the same destination keep call order).
    pub fn move_range(&mut self, start: u32, end: u32, dest: u32) {
        self.check_range(start, end);
        assert!(
            dest as usize <= self.source.len(),
            "move destination {} out of bounds",
            dest
        );
        self.edits.push(Edit {
            start,
            end,
            kind: EditKind::Move { dest },
            text: String::new(),
        });
    }

    pub fn insert_left(&mut self, pos: u32, text: impl Into<String>) {
        self.check_pos(pos);
        self.edits.push(Edit {
            start: pos,
            end: pos,
            kind: EditKind::InsertLeft,
            text: text.into(),
        });
    }

    pub fn insert_right(&mut self, pos: u32, text: impl Into<String>) {
        self.check_pos(pos);
        self.edits.push(Edit {
            start: pos,
            end: pos,
            kind: EditKind::InsertRight,
            text: text.into(),
        });
    }

    pub fn prepend(&mut self, text: impl Into<String>) {
        self.insert_left(0, text);
    }

    pub fn append(&mut self, text: impl Into<String>) {
        self.insert_right(self.source.len() as u32, text);
    }

    fn check_pos(&self, pos: u32) {
        assert!(
            self.source.is_char_boundary(pos as usize),
            "position {} is not a char boundary",
            pos
        );
    }

    fn check_range(&self, start: u32, end: u32) {
        assert!(start <= end, "inverted edit range {}..{}", start, end);
        assert!(
            end as usize <= self.source.len(),
            "edit range {}..{} out of bounds",
            start,
            end
        );
        self.check_pos(start);
        self.check_pos(end);
        if start == end {
            return;
        }
        for edit in &self.edits {
            let replaces = matches!(
                edit.kind,
                EditKind::Update | EditKind::Remove | EditKind::Move { .. }
            );
            if replaces && edit.start != edit.end && start < edit.end && edit.start < end {
                panic!(
                    "edit range {}..{} overlaps earlier edit {}..{}",
                    start, end, edit.start, edit.end
                );
            }
        }
    }

    fn compose(&self) -> Vec<Piece<'_>> {
        let len = self.source.len() as u32;
        let mut repls: Vec<(u32, u32, Option<usize>)> = Vec::new();
        let mut inserts: BTreeMap<u32, InsertGroup> = BTreeMap::new();

        for (idx, edit) in self.edits.iter().enumerate() {
            match edit.kind {
                EditKind::Update => repls.push((edit.start, edit.end, Some(idx))),
                EditKind::Remove => repls.push((edit.start, edit.end, None)),
                EditKind::Move { dest } => {
                    repls.push((edit.start, edit.end, None));
                    inserts
                        .entry(dest)
                        .or_default()
                        .rights
                        .push(RightPiece::Moved {
                            start: edit.start,
                            end: edit.end,
                        });
                }
                EditKind::InsertLeft => inserts.entry(edit.start).or_default().lefts.push(idx),
                EditKind::InsertRight => inserts
                    .entry(edit.start)
                    .or_default()
                    .rights
                    .push(RightPiece::Text(idx)),
            }
        }
        repls.sort_by_key(|r| (r.0, r.1));

        let positions: Vec<u32> = inserts.keys().copied().collect();
        let mut pieces: Vec<Piece<'_>> = Vec::new();
        let mut cursor = 0u32;
        let mut pos_idx = 0usize;

        for (rs, re, text_idx) in repls {
            self.flush_inserts(&mut pieces, &mut cursor, &mut pos_idx, &positions, &inserts, rs);
            if let Some(idx) = text_idx {
                pieces.push(Piece::Text {
                    text: &self.edits[idx].text,
                    anchor: Some(rs),
                });
            }
            cursor = cursor.max(re);
        }
        self.flush_inserts(&mut pieces, &mut cursor, &mut pos_idx, &positions, &inserts, len);
        pieces
    }

    fn flush_inserts<'s>(
        &'s self,
        pieces: &mut Vec<Piece<'s>>,
        cursor: &mut u32,
        pos_idx: &mut usize,
        positions: &[u32],
        inserts: &BTreeMap<u32, InsertGroup>,
        limit: u32,
    ) {
        while *pos_idx < positions.len() && positions[*pos_idx] <= limit {
            let pos = positions[*pos_idx];
            if pos > *cursor {
                pieces.push(Piece::Slice {
                    start: *cursor,
                    end: pos,
                    moved: false,
                });
                *cursor = pos;
            }
            let group = &inserts[&pos];
            for idx in &group.lefts {
                pieces.push(Piece::Text {
                    text: &self.edits[*idx].text,
                    anchor: None,
                });
            }
            for right in &group.rights {
                match right {
                    RightPiece::Text(idx) => pieces.push(Piece::Text {
                        text: &self.edits[*idx].text,
                        anchor: None,
                    }),
                    RightPiece::Moved { start, end } => pieces.push(Piece::Slice {
                        start: *start,
                        end: *end,
                        moved: true,
                    }),
                }
            }
            *pos_idx += 1;
        }
        if limit > *cursor {
            pieces.push(Piece::Slice {
                start: *cursor,
                end: limit,
                moved: false,
            });
            *cursor = limit;
        }
    }

    pub fn to_string(&self) -> String {
        let mut out = String::with_capacity(self.source.len());
        for piece in self.compose() {
            match piece {
                Piece::Slice { start, end, .. } => {
                    out.push_str(&self.source[start as usize..end as usize]);
                }
                Piece::Text { text, .. } => out.push_str(text),
            }
        }
        out
    }

    /// Derives the source map for the composed output. Edited and relocated
    /// ranges map character by character; untouched ranges map at chunk and
    /// line starts.
    pub fn generate_map(&self, opts: &MapOptions) -> SourceMap {
        let mut builder = SourceMapBuilder::new(opts.file.as_deref());
        let src_id = builder.add_source(&opts.source);
        if opts.include_content {
            builder.set_source_contents(src_id, Some(&self.source));
        }

        let mut out_line = 0u32;
        let mut out_col = 0u32;
        for piece in self.compose() {
            match piece {
                Piece::Slice { start, end, moved } => {
                    let text = &self.source[start as usize..end as usize];
                    let (mut src_line, mut src_col) = self.line_col(start);
                    if !moved {
                        builder.add(
                            out_line,
                            out_col,
                            src_line,
                            src_col,
                            Some(&opts.source),
                            None,
                            false,
                        );
                    }
                    let mut chars = text.chars().peekable();
                    while let Some(ch) = chars.next() {
                        if moved {
                            builder.add(
                                out_line,
                                out_col,
                                src_line,
                                src_col,
                                Some(&opts.source),
                                None,
                                false,
                            );
                        }
                        if ch == '\n' {
                            out_line += 1;
                            out_col = 0;
                            src_line += 1;
                            src_col = 0;
                            if !moved && chars.peek().is_some() {
                                builder.add(
                                    out_line,
                                    out_col,
                                    src_line,
                                    src_col,
                                    Some(&opts.source),
                                    None,
                                    false,
                                );
                            }
                        } else {
                            out_col += 1;
                            src_col += 1;
                        }
                    }
                }
                Piece::Text { text, anchor } => {
                    let anchor_pos = anchor.map(|a| self.line_col(a));
                    if let Some((sl, sc)) = anchor_pos {
                        builder.add(out_line, out_col, sl, sc, Some(&opts.source), None, false);
                    }
                    let mut chars = text.chars().peekable();
                    while let Some(ch) = chars.next() {
                        if ch == '\n' {
                            out_line += 1;
                            out_col = 0;
                            if let (Some((sl, sc)), true) = (anchor_pos, chars.peek().is_some()) {
                                builder.add(
                                    out_line,
                                    out_col,
                                    sl,
                                    sc,
                                    Some(&opts.source),
                                    None,
                                    false,
                                );
                            }
                        } else {
                            out_col += 1;
                        }
                    }
                }
            }
        }
        builder.into_sourcemap()
    }

    /// 0-based line and column (in chars) for an original byte offset.
    fn line_col(&self, offset: u32) -> (u32, u32) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        let line_start = self.line_starts[line] as usize;
        let col = self.source[line_start..offset as usize].chars().count() as u32;
        (line as u32, col)
    }
}
