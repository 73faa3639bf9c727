//! Walking the lexical scope tree.
//!
//! The walker classifies every DIE into one of five classes and uses the
//! classification both to find the scopes covering a PC and to enumerate
//! functions. `DW_TAG_imported_unit` children are walked transparently: the
//! imported unit's children behave as siblings of the importer's children
//! and the import itself never appears in any chain.

use crate::constants::*;
use crate::die::Die;
use crate::error::{DwarfErrorKind, Result};
use crate::reader::Dwarf;
use crate::unit::Unit;

/// The walker's classification of a DIE.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DieClass {
    /// No reason to look at or below this DIE.
    Ignore,
    /// Carries its own PC ranges which may match.
    Match,
    /// A concrete inline instance; a match must be resolved through its
    /// abstract origin.
    MatchInline,
    /// Carries no addresses itself but may own DIEs that do.
    Walk,
    /// `DW_TAG_imported_unit`: logically splices another unit in place.
    Imported,
}

/// Classifies a DIE for scope walking.
pub fn classify(die: &Die<'_, '_>) -> Result<DieClass> {
    Ok(match die.tag()? {
        DW_TAG_compile_unit
        | DW_TAG_module
        | DW_TAG_lexical_block
        | DW_TAG_with_stmt
        | DW_TAG_catch_block
        | DW_TAG_try_block
        | DW_TAG_entry_point => DieClass::Match,

        DW_TAG_inlined_subroutine => DieClass::MatchInline,

        // A subprogram with an abstract origin is a concrete out-of-line
        // instance of an inline; it is not guaranteed to be owned by the
        // right scope, so its origin must be searched for like an inlined
        // subroutine's.
        DW_TAG_subprogram => {
            if die.attr(DW_AT_abstract_origin)?.is_some() {
                DieClass::MatchInline
            } else {
                DieClass::Match
            }
        }

        DW_TAG_namespace | DW_TAG_class_type | DW_TAG_structure_type => DieClass::Walk,

        DW_TAG_imported_unit => DieClass::Imported,

        _ => DieClass::Ignore,
    })
}

/// Result of searching one subtree for a PC.
enum FindPc<'data, 'a> {
    /// Nothing below here covers the PC.
    NoMatch,
    /// The innermost-first chain of scopes covering the PC.
    Scopes(Vec<Die<'data, 'a>>),
    /// Like `Scopes`, but the outermost entry is a concrete inline
    /// instance: the enclosing scopes must be found through its abstract
    /// origin instead of its physical position.
    Inline(Vec<Die<'data, 'a>>),
}

/// Searches the children of `die` for the innermost scopes covering `pc`.
fn find_pc<'data, 'a>(die: &Die<'data, 'a>, pc: u64) -> Result<FindPc<'data, 'a>> {
    let mut matched = None;
    let mut have_walkable = false;

    let mut child = die.child()?;
    while let Some(c) = child {
        match classify(&c)? {
            class @ (DieClass::Match | DieClass::MatchInline) => {
                if c.has_pc(pc)? {
                    matched = Some((c, class));
                    break;
                }
            }
            DieClass::Walk => {
                if c.has_children()? {
                    have_walkable = true;
                }
            }
            DieClass::Imported => have_walkable = true,
            DieClass::Ignore => {}
        }
        child = c.sibling()?;
    }

    if let Some((c, class)) = matched {
        if c.has_children()? {
            match find_pc(&c, pc)? {
                FindPc::Scopes(mut inner) => {
                    inner.push(c);
                    return Ok(match class {
                        DieClass::Match => FindPc::Scopes(inner),
                        _ => FindPc::Inline(inner),
                    });
                }
                // A deeper concrete inline wins; its chain is already
                // frozen until the origin is resolved at the root.
                FindPc::Inline(inner) => return Ok(FindPc::Inline(inner)),
                FindPc::NoMatch => {}
            }
        }

        // No child of c narrows the match further, so c is the innermost.
        return Ok(match class {
            DieClass::Match => FindPc::Scopes(vec![c]),
            _ => FindPc::Inline(vec![c]),
        });
    }

    if !have_walkable {
        return Ok(FindPc::NoMatch);
    }

    // Nothing matched directly, but address-less owners or imported units
    // might hide a match below them.
    let mut child = die.child()?;
    while let Some(c) = child {
        match classify(&c)? {
            DieClass::Walk => {
                if c.has_children()? {
                    match find_pc(&c, pc)? {
                        FindPc::Scopes(mut inner) => {
                            inner.push(c);
                            return Ok(FindPc::Scopes(inner));
                        }
                        FindPc::Inline(inner) => return Ok(FindPc::Inline(inner)),
                        FindPc::NoMatch => {}
                    }
                }
            }
            DieClass::Imported => {
                if let Some(attr) = c.attr(DW_AT_import)? {
                    // Search the referenced unit in place, without recording
                    // an inner scope level for the import.
                    match find_pc(&attr.reference()?, pc)? {
                        FindPc::NoMatch => {}
                        other => return Ok(other),
                    }
                }
            }
            _ => {}
        }
        child = c.sibling()?;
    }

    Ok(FindPc::NoMatch)
}

/// Finds the chain of scopes owning `owned`, appended to `out`
/// innermost-first, following imported units transparently.
///
/// Returns whether `owned` was found below `owner`. The innermost appended
/// entry is `owned`'s direct owner; `owned` itself is not appended.
fn find_die<'data, 'a>(
    owner: &Die<'data, 'a>,
    owned: &Die<'data, 'a>,
    out: &mut Vec<Die<'data, 'a>>,
) -> Result<bool> {
    let mut child = owner.child()?;
    while let Some(c) = child {
        if c == *owned {
            return Ok(true);
        }

        // The physical layout cannot short-circuit dead ends: an imported
        // unit may refer to the true owner indirectly.
        match classify(&c)? {
            DieClass::Match | DieClass::MatchInline | DieClass::Walk => {
                if c.has_children()? && find_die(&c, owned, out)? {
                    out.push(c);
                    return Ok(true);
                }
            }
            DieClass::Imported => {
                if let Some(attr) = c.attr(DW_AT_import)? {
                    if find_die(&attr.reference()?, owned, out)? {
                        // The import contributes no scope level.
                        return Ok(true);
                    }
                }
            }
            _ => {}
        }
        child = c.sibling()?;
    }
    Ok(false)
}

impl<'data> Unit<'data> {
    /// Returns the scopes covering `pc` in this unit, innermost first, the
    /// unit DIE last.
    ///
    /// When the innermost match is a concrete inline instance, the chain
    /// continues with the lexical owners of the instance's abstract origin,
    /// found by searching the tree through any imported units.
    pub fn scopes_for_pc<'a>(
        &'a self,
        dwarf: &'a Dwarf<'data>,
        pc: u64,
    ) -> Result<Vec<Die<'data, 'a>>> {
        let root = self.root(dwarf);
        match find_pc(&root, pc)? {
            FindPc::NoMatch => Err(dwarf.record(DwarfErrorKind::NoMatch)),
            FindPc::Scopes(mut scopes) => {
                scopes.push(root);
                Ok(scopes)
            }
            FindPc::Inline(mut scopes) => {
                // The outermost stored scope is the concrete instance; its
                // definition scopes hang off the abstract origin.
                let instance = *scopes.last().expect("inline chain is never empty");
                let origin = instance
                    .attr(DW_AT_abstract_origin)?
                    .ok_or_else(|| dwarf.record(DwarfErrorKind::InvalidFormat))?
                    .reference()?;

                let mut owners = Vec::new();
                if !find_die(&root, &origin, &mut owners)? {
                    return Err(dwarf.record(DwarfErrorKind::InvalidFormat));
                }
                scopes.extend(owners);
                scopes.push(root);
                Ok(scopes)
            }
        }
    }

    /// Visits every defining `DW_TAG_subprogram` DIE of this unit.
    ///
    /// The callback returns whether to keep going. For C compilation units
    /// most subtrees cannot contain nested functions, so anything that is
    /// not a subprogram, lexical block or inlined subroutine is pruned
    /// eagerly.
    pub fn for_each_function<'a, F>(&'a self, dwarf: &'a Dwarf<'data>, mut callback: F) -> Result<()>
    where
        F: FnMut(Die<'data, 'a>) -> Result<bool>,
    {
        let root = self.root(dwarf);
        if root.tag()? != DW_TAG_compile_unit {
            return Err(dwarf.record(DwarfErrorKind::InvalidFormat));
        }

        let language = self.language(dwarf)?;
        let c_cu = matches!(
            language,
            Some(DW_LANG_C) | Some(DW_LANG_C89) | Some(DW_LANG_C99)
        );

        let first = match root.child()? {
            Some(child) => child,
            None => return Ok(()),
        };

        walk_children(0, first, &mut |_, die| {
            let tag = die.tag()?;
            if c_cu
                && tag != DW_TAG_subprogram
                && tag != DW_TAG_lexical_block
                && tag != DW_TAG_inlined_subroutine
            {
                return Ok(VisitFlow::Prune);
            }
            if tag != DW_TAG_subprogram || die.attr(DW_AT_declaration)?.is_some() {
                return Ok(VisitFlow::Continue);
            }
            Ok(if callback(*die)? {
                VisitFlow::Continue
            } else {
                VisitFlow::Stop
            })
        })
        .map(|_| ())
    }
}

/// Visitor verdict for one DIE.
enum VisitFlow {
    /// Descend into matching children as usual.
    Continue,
    /// Do not descend below this DIE.
    Prune,
    /// Abort the whole walk.
    Stop,
}

/// Walks `child` and its siblings depth-first, splicing imported units in
/// place. Returns `false` if the visitor aborted.
fn walk_children<'data, 'a, F>(
    depth: usize,
    mut child: Die<'data, 'a>,
    visit: &mut F,
) -> Result<bool>
where
    F: FnMut(usize, &Die<'data, 'a>) -> Result<VisitFlow>,
{
    loop {
        // For an imported unit, the children of that unit are logically
        // siblings of the other children: walk them in place rather than
        // recording a deeper level.
        while classify(&child)? == DieClass::Imported {
            if let Some(attr) = child.attr(DW_AT_import)? {
                let target = attr.reference()?;
                if let Some(imported_child) = target.child()? {
                    if !walk_children(depth, imported_child, visit)? {
                        return Ok(false);
                    }
                }
            }
            match child.sibling()? {
                Some(sibling) => child = sibling,
                None => return Ok(true),
            }
        }

        match visit(depth + 1, &child)? {
            VisitFlow::Stop => return Ok(false),
            VisitFlow::Prune => {}
            VisitFlow::Continue => {
                if matches!(
                    classify(&child)?,
                    DieClass::Match | DieClass::MatchInline | DieClass::Walk
                ) && child.has_children()?
                {
                    if let Some(grandchild) = child.child()? {
                        if !walk_children(depth + 1, grandchild, visit)? {
                            return Ok(false);
                        }
                    }
                }
            }
        }

        match child.sibling()? {
            Some(sibling) => child = sibling,
            None => return Ok(true),
        }
    }
}
