//! Builds small ext2 images in memory for tests.
//!
//! Fixed geometry: 1024-byte blocks, a single block group, inode table at
//! block 5, data blocks from block 16. Sizes stay far below the group
//! limits, which is plenty for exercising the reader.

use std::collections::BTreeMap;

const BLOCK_SIZE: usize = 1024;
const INODE_SIZE: usize = 128;
const INODE_TABLE_BLOCK: usize = 5;
const FIRST_DATA_ALLOC: u32 = 16;
const TOTAL_INODES: u32 = 64;
const ROOT_INO: u32 = 2;
const FIRST_FREE_INO: u32 = 11;

const PTRS_PER_BLOCK: usize = BLOCK_SIZE / 4;

enum Spec {
    Dir(BTreeMap<String, Spec>),
    File(Vec<u8>),
    Symlink(String),
}

pub struct Ext2Builder {
    root: BTreeMap<String, Spec>,
}

impl Ext2Builder {
    pub fn new() -> Self {
        Self {
            root: BTreeMap::new(),
        }
    }

    pub fn add_file(&mut self, path: &str, content: &[u8]) {
        self.insert(path, Spec::File(content.to_vec()));
    }

    pub fn add_dir(&mut self, path: &str) {
        self.insert(path, Spec::Dir(BTreeMap::new()));
    }

    pub fn add_symlink(&mut self, path: &str, target: &str) {
        self.insert(path, Spec::Symlink(target.to_string()));
    }

    fn insert(&mut self, path: &str, spec: Spec) {
        let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let leaf = components.pop().expect("path must name something");

        let mut dir = &mut self.root;
        for comp in components {
            let entry = dir
                .entry(comp.to_string())
                .or_insert_with(|| Spec::Dir(BTreeMap::new()));
            dir = match entry {
                Spec::Dir(d) => d,
                _ => panic!("path component {comp} is not a directory"),
            };
        }

        dir.insert(leaf.to_string(), spec);
    }

    pub fn build(self) -> Vec<u8> {
        let total_blocks = FIRST_DATA_ALLOC + estimate_blocks(&self.root) + 16;
        let mut img = vec![0u8; total_blocks as usize * BLOCK_SIZE];

        // Superblock at byte 1024
        let sb = 1024;
        w32(&mut img, sb, TOTAL_INODES); // total inodes
        w32(&mut img, sb + 4, total_blocks); // total blocks
        w32(&mut img, sb + 20, 1); // first data block
        w32(&mut img, sb + 24, 0); // log block size (1024)
        w32(&mut img, sb + 32, 8192); // blocks per group
        w32(&mut img, sb + 40, TOTAL_INODES); // inodes per group
        w16(&mut img, sb + 56, 0xEF53); // magic
        w32(&mut img, sb + 76, 1); // revision
        w16(&mut img, sb + 88, INODE_SIZE as u16); // inode size

        // Group descriptor at block 2: only the inode table matters
        let gd = 2 * BLOCK_SIZE;
        w32(&mut img, gd + 8, INODE_TABLE_BLOCK as u32);

        let mut next_ino = FIRST_FREE_INO;
        let mut next_blk = FIRST_DATA_ALLOC;
        emit_dir(
            &self.root,
            ROOT_INO,
            ROOT_INO,
            &mut img,
            &mut next_ino,
            &mut next_blk,
        );

        img
    }
}

fn estimate_blocks(dir: &BTreeMap<String, Spec>) -> u32 {
    let mut n = 1; // the directory block itself
    for spec in dir.values() {
        n += match spec {
            Spec::Dir(d) => estimate_blocks(d),
            Spec::File(content) => {
                let nb = content.len().div_ceil(BLOCK_SIZE) as u32;
                let mut overhead = 0;
                if nb as usize > 12 {
                    overhead += 1;
                }
                if nb as usize > 12 + PTRS_PER_BLOCK {
                    let in_double = nb as usize - 12 - PTRS_PER_BLOCK;
                    overhead += 1 + in_double.div_ceil(PTRS_PER_BLOCK) as u32;
                }
                nb + overhead
            }
            Spec::Symlink(t) => u32::from(t.len() > 60),
        };
    }
    n
}

/// Write a directory and, recursively, everything in it. Returns nothing;
/// inode and block counters advance as structures are laid down.
fn emit_dir(
    dir: &BTreeMap<String, Spec>,
    ino: u32,
    parent_ino: u32,
    img: &mut Vec<u8>,
    next_ino: &mut u32,
    next_blk: &mut u32,
) {
    // Assign child inode numbers first so the directory block can name them
    let mut children: Vec<(u32, &String, &Spec)> = Vec::new();
    for (name, spec) in dir {
        children.push((*next_ino, name, spec));
        *next_ino += 1;
    }

    // Directory data block
    let dir_blk = alloc_block(next_blk);
    let base = dir_blk as usize * BLOCK_SIZE;
    let mut off = 0usize;

    let mut entries: Vec<(u32, &str, u8)> = vec![(ino, ".", 2), (parent_ino, "..", 2)];
    for (child_ino, name, spec) in &children {
        let tag = match spec {
            Spec::Dir(_) => 2,
            Spec::File(_) => 1,
            Spec::Symlink(_) => 7,
        };
        entries.push((*child_ino, name.as_str(), tag));
    }

    for (i, (entry_ino, name, tag)) in entries.iter().enumerate() {
        let name_bytes = name.as_bytes();
        let rec_len = if i == entries.len() - 1 {
            BLOCK_SIZE - off // last entry absorbs the remainder
        } else {
            (8 + name_bytes.len() + 3) & !3
        };

        let at = base + off;
        w32(img, at, *entry_ino);
        w16(img, at + 4, rec_len as u16);
        img[at + 6] = name_bytes.len() as u8;
        img[at + 7] = *tag;
        img[at + 8..at + 8 + name_bytes.len()].copy_from_slice(name_bytes);

        off += rec_len;
    }
    assert!(off == BLOCK_SIZE, "directory overflowed its single block");

    let mut blocks = [0u32; 15];
    blocks[0] = dir_blk;
    write_inode(img, ino, 0o040755, BLOCK_SIZE as u32, &blocks, None);

    // Children
    for (child_ino, _, spec) in &children {
        match spec {
            Spec::Dir(d) => emit_dir(d, *child_ino, ino, img, next_ino, next_blk),
            Spec::File(content) => emit_file(content, *child_ino, img, next_blk),
            Spec::Symlink(target) => emit_symlink(target, *child_ino, img, next_blk),
        }
    }
}

fn emit_file(content: &[u8], ino: u32, img: &mut Vec<u8>, next_blk: &mut u32) {
    let nb = content.len().div_ceil(BLOCK_SIZE);
    let mut data_blocks = Vec::with_capacity(nb);

    // All-zero blocks become holes
    for chunk in content.chunks(BLOCK_SIZE) {
        if chunk.iter().all(|&b| b == 0) {
            data_blocks.push(0u32);
        } else {
            let blk = alloc_block(next_blk);
            let at = blk as usize * BLOCK_SIZE;
            img[at..at + chunk.len()].copy_from_slice(chunk);
            data_blocks.push(blk);
        }
    }

    let mut blocks = [0u32; 15];
    for (i, blk) in data_blocks.iter().take(12).enumerate() {
        blocks[i] = *blk;
    }

    if nb > 12 {
        let table = alloc_block(next_blk);
        blocks[12] = table;
        let end = nb.min(12 + PTRS_PER_BLOCK);
        for (slot, blk) in data_blocks[12..end].iter().enumerate() {
            w32(img, table as usize * BLOCK_SIZE + slot * 4, *blk);
        }
    }

    if nb > 12 + PTRS_PER_BLOCK {
        let top = alloc_block(next_blk);
        blocks[13] = top;
        for (l2_index, l2_chunk) in data_blocks[12 + PTRS_PER_BLOCK..]
            .chunks(PTRS_PER_BLOCK)
            .enumerate()
        {
            let table = alloc_block(next_blk);
            w32(img, top as usize * BLOCK_SIZE + l2_index * 4, table);
            for (slot, blk) in l2_chunk.iter().enumerate() {
                w32(img, table as usize * BLOCK_SIZE + slot * 4, *blk);
            }
        }
    }

    write_inode(img, ino, 0o100644, content.len() as u32, &blocks, None);
}

fn emit_symlink(target: &str, ino: u32, img: &mut Vec<u8>, next_blk: &mut u32) {
    let bytes = target.as_bytes();
    if bytes.len() <= 60 {
        write_inode(img, ino, 0o120777, bytes.len() as u32, &[0; 15], Some(bytes));
    } else {
        let blk = alloc_block(next_blk);
        let at = blk as usize * BLOCK_SIZE;
        img[at..at + bytes.len()].copy_from_slice(bytes);
        let mut blocks = [0u32; 15];
        blocks[0] = blk;
        write_inode(img, ino, 0o120777, bytes.len() as u32, &blocks, None);
    }
}

fn write_inode(
    img: &mut Vec<u8>,
    ino: u32,
    mode: u16,
    size: u32,
    blocks: &[u32; 15],
    inline: Option<&[u8]>,
) {
    let at = INODE_TABLE_BLOCK * BLOCK_SIZE + (ino as usize - 1) * INODE_SIZE;
    w16(img, at, mode);
    w32(img, at + 4, size);
    w16(img, at + 26, 1); // link count

    match inline {
        Some(bytes) => img[at + 40..at + 40 + bytes.len()].copy_from_slice(bytes),
        None => {
            for (i, blk) in blocks.iter().enumerate() {
                w32(img, at + 40 + i * 4, *blk);
            }
        }
    }
}

fn alloc_block(next_blk: &mut u32) -> u32 {
    let blk = *next_blk;
    *next_blk += 1;
    blk
}

fn w16(img: &mut [u8], at: usize, v: u16) {
    img[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn w32(img: &mut [u8], at: usize, v: u32) {
    img[at..at + 4].copy_from_slice(&v.to_le_bytes());
}
