//! Builds small ext2 images for boot-disk tests.
//!
//! Fixed geometry: 1024-byte blocks, one block group, inode table at
//! block 5, data from block 16. Only directories and direct-block files
//! are supported, which is all a boot disk needs; the filesystem crate's
//! own suite covers the deeper mapping cases.

use std::collections::BTreeMap;

const BLOCK_SIZE: usize = 1024;
const INODE_SIZE: usize = 128;
const INODE_TABLE_BLOCK: usize = 5;
const FIRST_DATA_BLOCK: u32 = 16;
const TOTAL_INODES: u32 = 64;
const ROOT_INO: u32 = 2;
const FIRST_FREE_INO: u32 = 11;

enum Entry {
    Dir(BTreeMap<String, Entry>),
    File(Vec<u8>),
}

/// An ext2 image under construction.
pub struct FsImage {
    root: BTreeMap<String, Entry>,
}

impl FsImage {
    pub fn new() -> Self {
        Self {
            root: BTreeMap::new(),
        }
    }

    /// Add a file, creating intermediate directories.
    pub fn file(mut self, path: &str, content: &[u8]) -> Self {
        assert!(
            content.len() <= 12 * BLOCK_SIZE,
            "builder only lays down direct blocks"
        );

        let mut components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        let leaf = components.pop().expect("path must name a file");

        let mut dir = &mut self.root;
        for comp in components {
            let entry = dir
                .entry(comp.to_string())
                .or_insert_with(|| Entry::Dir(BTreeMap::new()));
            dir = match entry {
                Entry::Dir(d) => d,
                Entry::File(_) => panic!("path component {comp} is a file"),
            };
        }
        dir.insert(leaf.to_string(), Entry::File(content.to_vec()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let total_blocks = FIRST_DATA_BLOCK + count_blocks(&self.root) + 8;
        let mut img = vec![0u8; total_blocks as usize * BLOCK_SIZE];

        // Superblock at byte 1024
        let sb = BLOCK_SIZE;
        wle32(&mut img, sb, TOTAL_INODES);
        wle32(&mut img, sb + 4, total_blocks);
        wle32(&mut img, sb + 20, 1); // first data block
        wle32(&mut img, sb + 24, 0); // log block size (1024)
        wle32(&mut img, sb + 32, 8192); // blocks per group
        wle32(&mut img, sb + 40, TOTAL_INODES); // inodes per group
        wle16(&mut img, sb + 56, 0xEF53);
        wle32(&mut img, sb + 76, 1); // revision
        wle16(&mut img, sb + 88, INODE_SIZE as u16);

        // Group descriptor at block 2: only the inode table location
        wle32(&mut img, 2 * BLOCK_SIZE + 8, INODE_TABLE_BLOCK as u32);

        let mut next_ino = FIRST_FREE_INO;
        let mut next_blk = FIRST_DATA_BLOCK;
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

fn count_blocks(dir: &BTreeMap<String, Entry>) -> u32 {
    let mut n = 1;
    for entry in dir.values() {
        n += match entry {
            Entry::Dir(d) => count_blocks(d),
            Entry::File(content) => content.len().div_ceil(BLOCK_SIZE) as u32,
        };
    }
    n
}

fn emit_dir(
    dir: &BTreeMap<String, Entry>,
    ino: u32,
    parent_ino: u32,
    img: &mut [u8],
    next_ino: &mut u32,
    next_blk: &mut u32,
) {
    let mut children: Vec<(u32, &String, &Entry)> = Vec::new();
    for (name, entry) in dir {
        children.push((*next_ino, name, entry));
        *next_ino += 1;
    }

    let dir_blk = *next_blk;
    *next_blk += 1;
    let base = dir_blk as usize * BLOCK_SIZE;

    let mut records: Vec<(u32, &str, u8)> = vec![(ino, ".", 2), (parent_ino, "..", 2)];
    for (child_ino, name, entry) in &children {
        let tag = match entry {
            Entry::Dir(_) => 2,
            Entry::File(_) => 1,
        };
        records.push((*child_ino, name.as_str(), tag));
    }

    let mut off = 0usize;
    for (i, (rec_ino, name, tag)) in records.iter().enumerate() {
        let name = name.as_bytes();
        let rec_len = if i == records.len() - 1 {
            BLOCK_SIZE - off // last record absorbs the remainder
        } else {
            (8 + name.len() + 3) & !3
        };

        let at = base + off;
        wle32(img, at, *rec_ino);
        wle16(img, at + 4, rec_len as u16);
        img[at + 6] = name.len() as u8;
        img[at + 7] = *tag;
        img[at + 8..at + 8 + name.len()].copy_from_slice(name);
        off += rec_len;
    }
    assert_eq!(off, BLOCK_SIZE, "directory overflowed its single block");

    let mut blocks = [0u32; 15];
    blocks[0] = dir_blk;
    write_inode(img, ino, 0o040755, BLOCK_SIZE as u32, &blocks);

    for (child_ino, _, entry) in &children {
        match entry {
            Entry::Dir(d) => emit_dir(d, *child_ino, ino, img, next_ino, next_blk),
            Entry::File(content) => emit_file(content, *child_ino, img, next_blk),
        }
    }
}

fn emit_file(content: &[u8], ino: u32, img: &mut [u8], next_blk: &mut u32) {
    let mut blocks = [0u32; 15];
    for (i, chunk) in content.chunks(BLOCK_SIZE).enumerate() {
        let blk = *next_blk;
        *next_blk += 1;
        blocks[i] = blk;
        let at = blk as usize * BLOCK_SIZE;
        img[at..at + chunk.len()].copy_from_slice(chunk);
    }
    write_inode(img, ino, 0o100644, content.len() as u32, &blocks);
}

fn write_inode(img: &mut [u8], ino: u32, mode: u16, size: u32, blocks: &[u32; 15]) {
    let at = INODE_TABLE_BLOCK * BLOCK_SIZE + (ino as usize - 1) * INODE_SIZE;
    wle16(img, at, mode);
    wle32(img, at + 4, size);
    wle16(img, at + 26, 1); // link count
    for (i, blk) in blocks.iter().enumerate() {
        wle32(img, at + 40 + i * 4, *blk);
    }
}

fn wle16(img: &mut [u8], at: usize, v: u16) {
    img[at..at + 2].copy_from_slice(&v.to_le_bytes());
}

fn wle32(img: &mut [u8], at: usize, v: u32) {
    img[at..at + 4].copy_from_slice(&v.to_le_bytes());
}
