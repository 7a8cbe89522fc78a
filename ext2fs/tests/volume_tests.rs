//! Mount and superblock validation tests

mod common;

use common::{Ext2Builder, MemoryBlockDevice};
use ext2fs::{mount, Ext2Error};

#[test]
fn mounts_a_fresh_image() {
    let mut builder = Ext2Builder::new();
    builder.add_file("/hello.txt", b"hello");
    let mut device = MemoryBlockDevice::new(builder.build());

    let sectors = device.sectors();
    let volume = mount(&mut device, 0, sectors).expect("should mount");

    assert_eq!(volume.superblock().block_size(), 1024);
    assert_eq!(volume.superblock().inode_size, 128);
    assert_eq!(volume.superblock().first_data_block, 1);
}

#[test]
fn mounts_behind_a_partition_offset() {
    let mut builder = Ext2Builder::new();
    builder.add_file("/boot/vmlinux", b"kernel bytes");
    let image = builder.build();
    let image_sectors = (image.len() / 512) as u64;

    let mut device = MemoryBlockDevice::with_offset(image, 63);
    let volume = mount(&mut device, 63, image_sectors).expect("should mount at offset");
    assert_eq!(volume.superblock().block_size(), 1024);
}

#[test]
fn rejects_wrong_magic() {
    let mut device = MemoryBlockDevice::new(vec![0u8; 64 * 1024]);
    let sectors = device.sectors();
    let err = mount(&mut device, 0, sectors).unwrap_err();
    assert_eq!(err, Ext2Error::NotExt2);
}

#[test]
fn rejects_a_truncated_device() {
    // One sector: the superblock cannot even be read
    let mut device = MemoryBlockDevice::new(vec![0u8; 512]);
    let err = mount(&mut device, 0, 1).unwrap_err();
    assert_eq!(err, Ext2Error::OutOfBounds);
}

#[test]
fn revision_zero_defaults_inode_size() {
    let mut builder = Ext2Builder::new();
    builder.add_file("/f", b"x");
    let mut image = builder.build();

    // Rewrite the superblock as revision 0 with a garbage inode-size field
    image[1024 + 76..1024 + 80].copy_from_slice(&0u32.to_le_bytes());
    image[1024 + 88..1024 + 90].copy_from_slice(&0u16.to_le_bytes());

    let mut device = MemoryBlockDevice::new(image);
    let sectors = device.sectors();
    let volume = mount(&mut device, 0, sectors).expect("revision 0 should mount");
    assert_eq!(volume.superblock().inode_size, 128);
}
