//! Directory iteration and path resolution

pub mod record;

use crate::error::{Ext2Error, Result};
use crate::file::read_at;
use crate::inode::Node;
use crate::types::{DirEntry, FileKind, INLINE_SYMLINK_MAX, MAX_SYMLINK_DEPTH};
use crate::volume::Volume;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use gpt_disk_io::BlockIo;
use log::debug;
use record::DirentHeader;

/// One named entry pulled out of a directory stream.
struct RawEntry {
    ino: u32,
    name: String,
    tag: Option<FileKind>,
}

/// Advance through the directory stream at `*pos`, returning the next
/// named entry, or `None` once the declared directory size is reached.
fn next_entry<B: BlockIo>(
    block_io: &mut B,
    volume: &mut Volume,
    dir: &mut Node,
    pos: &mut u32,
) -> Result<Option<RawEntry>> {
    let dir_size = dir.inode(volume, block_io)?.size;

    while *pos < dir_size {
        let mut raw = [0u8; DirentHeader::SIZE];
        read_at(block_io, volume, dir, *pos, &mut raw)?;
        let head = DirentHeader::parse(&raw);

        if head.rec_len == 0 {
            // A zero-length record would never advance.
            return Err(Ext2Error::Corrupt);
        }

        if head.name_len != 0 && head.ino != 0 {
            let mut name_buf = vec![0u8; head.name_len as usize];
            read_at(
                block_io,
                volume,
                dir,
                *pos + DirentHeader::SIZE as u32,
                &mut name_buf,
            )?;
            *pos += u32::from(head.rec_len);

            return Ok(Some(RawEntry {
                ino: head.ino,
                name: String::from_utf8_lossy(&name_buf).into_owned(),
                tag: FileKind::from_dirent_tag(head.type_tag),
            }));
        }

        *pos += u32::from(head.rec_len);
    }

    Ok(None)
}

/// Search a directory for an entry by name.
///
/// The returned node's inode is only read when the entry carried no type
/// tag and the inode mode was needed to classify it.
fn find_in_dir<B: BlockIo>(
    block_io: &mut B,
    volume: &mut Volume,
    dir: &mut Node,
    name: &str,
) -> Result<(Node, FileKind)> {
    let mut pos = 0u32;
    while let Some(entry) = next_entry(block_io, volume, dir, &mut pos)? {
        if entry.name != name {
            continue;
        }

        return match entry.tag {
            Some(kind) => Ok((Node::new(entry.ino), kind)),
            None => {
                let inode = volume.read_inode(block_io, entry.ino)?;
                let kind = inode.kind();
                Ok((Node::with_inode(entry.ino, inode), kind))
            }
        };
    }

    Err(Ext2Error::NotFound)
}

/// Read a symlink target, inline from the inode when short enough.
fn read_symlink<B: BlockIo>(
    block_io: &mut B,
    volume: &mut Volume,
    node: &mut Node,
) -> Result<String> {
    let inode = node.inode(volume, block_io)?.clone();

    if inode.size <= INLINE_SYMLINK_MAX {
        let raw = &inode.inline[..inode.size as usize];
        return Ok(String::from_utf8_lossy(raw).into_owned());
    }

    let mut buf = vec![0u8; inode.size as usize];
    read_at(block_io, volume, node, 0, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Walk `path` starting from `start`, following symlinks.
///
/// `nest` counts symlinks followed across the whole resolution, including
/// recursion into targets; crossing [`MAX_SYMLINK_DEPTH`] reports a loop.
fn resolve_from<B: BlockIo>(
    block_io: &mut B,
    volume: &mut Volume,
    start: Node,
    path: &str,
    nest: &mut u32,
) -> Result<(Node, FileKind)> {
    let mut current = start;
    let mut current_kind = FileKind::Directory;

    for component in path.split('/').filter(|c| !c.is_empty()) {
        if current_kind != FileKind::Directory {
            return Err(Ext2Error::NotFound);
        }

        let parent = current.clone();
        let (mut next, mut kind) = find_in_dir(block_io, volume, &mut current, component)?;

        if kind == FileKind::Symlink {
            *nest += 1;
            if *nest >= MAX_SYMLINK_DEPTH {
                return Err(Ext2Error::SymlinkLoop);
            }

            let target = read_symlink(block_io, volume, &mut next)?;
            debug!("ext2 symlink {} -> {}", component, target);

            // Absolute targets restart at the root, relative ones at the
            // directory containing the link.
            let base = if target.starts_with('/') {
                volume.root_node()
            } else {
                parent
            };

            let resolved = resolve_from(block_io, volume, base, &target, nest)?;
            next = resolved.0;
            kind = resolved.1;
        }

        current = next;
        current_kind = kind;
    }

    Ok((current, current_kind))
}

/// Resolve a path from the root to a node of the expected kind.
///
/// Paths must be absolute; repeated slashes are tolerated. When the
/// resolution lands on something other than the expected regular file or
/// directory, that is reported as [`Ext2Error::NotFound`] rather than a
/// distinct type error.
pub fn lookup<B: BlockIo>(
    block_io: &mut B,
    volume: &mut Volume,
    path: &str,
    expected: FileKind,
) -> Result<Node> {
    let mut nest = 0u32;
    let (node, kind) = resolve_from(block_io, volume, volume.root_node(), path, &mut nest)?;

    match expected {
        FileKind::Regular | FileKind::Directory if kind != expected => Err(Ext2Error::NotFound),
        _ => Ok(node),
    }
}

/// List a directory by path.
///
/// "." and ".." are omitted. Each entry's inode is read so listings can
/// show sizes, matching what an interactive `ls` wants.
pub fn read_dir<B: BlockIo>(
    block_io: &mut B,
    volume: &mut Volume,
    path: &str,
) -> Result<Vec<DirEntry>> {
    let mut dir = lookup(block_io, volume, path, FileKind::Directory)?;

    let mut entries = Vec::new();
    let mut pos = 0u32;
    while let Some(entry) = next_entry(block_io, volume, &mut dir, &mut pos)? {
        if entry.name == "." || entry.name == ".." {
            continue;
        }

        let inode = volume.read_inode(block_io, entry.ino)?;
        entries.push(DirEntry {
            ino: entry.ino,
            name: entry.name,
            kind: entry.tag.unwrap_or_else(|| inode.kind()),
            size: inode.size,
        });
    }

    Ok(entries)
}
