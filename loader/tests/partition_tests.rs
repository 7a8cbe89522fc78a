//! Partition resolver tests: both on-disk schemes and the fallback
//! chain between them.

mod common;

use common::{dos_disk, mac_disk, DosEntry, MacEntry, MockFirmware, SECTOR_SIZE};
use ofboot_loader::disk::partition::{self, Partition};
use ofboot_loader::disk::FwDisk;
use ofboot_loader::error::Error;
use ofboot_loader::prom::Firmware;

fn resolve(fw: &mut MockFirmware, index: u32) -> Result<Partition, Error> {
    let dev = fw.open("disk").unwrap();
    partition::resolve(&mut FwDisk::new(fw, dev), index)
}

fn three_mac_entries() -> Vec<u8> {
    mac_disk(&[
        MacEntry {
            start_sector: 100,
            sectors: 50,
            bootable: false,
            processor: "",
        },
        MacEntry {
            start_sector: 200,
            sectors: 60,
            bootable: true,
            processor: "powerpc",
        },
        MacEntry {
            start_sector: 300,
            sectors: 70,
            bootable: false,
            processor: "",
        },
    ])
}

#[test]
fn mac_indexed_lookup_matches_table_order() {
    let mut fw = MockFirmware::new();
    fw.add_disk("disk", three_mac_entries());

    for (index, start) in [(1u32, 100u64), (2, 200), (3, 300)] {
        let part = resolve(&mut fw, index).unwrap();
        assert_eq!(part.start, start * SECTOR_SIZE as u64);
    }
    assert_eq!(
        resolve(&mut fw, 2).unwrap().len,
        60 * SECTOR_SIZE as u64
    );
}

#[test]
fn mac_index_zero_selects_bootable_matching_processor() {
    let mut fw = MockFirmware::new();
    fw.add_disk("disk", three_mac_entries());

    // The bootable entry declares "powerpc"; matching is case-insensitive.
    let part = resolve(&mut fw, 0).unwrap();
    assert_eq!(part.start, 200 * SECTOR_SIZE as u64);
}

#[test]
fn mac_index_past_table_is_not_found() {
    let mut fw = MockFirmware::new();
    fw.add_disk("disk", three_mac_entries());
    assert_eq!(resolve(&mut fw, 4), Err(Error::PartNotFound));
}

#[test]
fn mac_inconsistent_map_count_aborts_the_walk() {
    let mut disk = three_mac_entries();
    // Second entry suddenly claims a different map size.
    let at = 2 * SECTOR_SIZE + 4;
    disk[at..at + 4].copy_from_slice(&9u32.to_be_bytes());

    let mut fw = MockFirmware::new();
    fw.add_disk("disk", disk);

    // Entry 1 still resolves; the walk stops before entries 2 and 3.
    assert!(resolve(&mut fw, 1).is_ok());
    assert_eq!(resolve(&mut fw, 2), Err(Error::PartNotFound));
}

#[test]
fn dos_indexed_lookup_reads_the_right_record() {
    let mut fw = MockFirmware::new();
    fw.add_disk(
        "disk",
        dos_disk(&[
            DosEntry {
                active: false,
                start_sector: 10,
                sectors: 5,
            },
            DosEntry {
                active: true,
                start_sector: 20,
                sectors: 6,
            },
            DosEntry {
                active: false,
                start_sector: 30,
                sectors: 7,
            },
        ]),
    );

    for (index, start, sectors) in [(1u32, 10u64, 5u64), (2, 20, 6), (3, 30, 7)] {
        let part = resolve(&mut fw, index).unwrap();
        assert_eq!(part.start, start * SECTOR_SIZE as u64);
        assert_eq!(part.len, sectors * SECTOR_SIZE as u64);
    }
}

#[test]
fn dos_index_zero_scans_for_the_active_flag() {
    let mut fw = MockFirmware::new();
    fw.add_disk(
        "disk",
        dos_disk(&[
            DosEntry {
                active: false,
                start_sector: 10,
                sectors: 5,
            },
            DosEntry {
                active: true,
                start_sector: 20,
                sectors: 6,
            },
        ]),
    );

    let part = resolve(&mut fw, 0).unwrap();
    assert_eq!(part.start, 20 * SECTOR_SIZE as u64);
}

#[test]
fn dos_index_four_and_up_never_reads_out_of_bounds() {
    let mut fw = MockFirmware::new();
    fw.add_disk(
        "disk",
        dos_disk(&[DosEntry {
            active: true,
            start_sector: 10,
            sectors: 5,
        }]),
    );

    assert_eq!(resolve(&mut fw, 4), Err(Error::PartNotFound));
    assert_eq!(resolve(&mut fw, 99), Err(Error::PartNotFound));
}

#[test]
fn unknown_schemes_fall_through_to_not_partitioned() {
    let mut fw = MockFirmware::new();
    fw.add_disk("disk", vec![0u8; SECTOR_SIZE]);
    assert_eq!(resolve(&mut fw, 1), Err(Error::PartNotPartitioned));
}

#[test]
fn truncated_device_is_a_short_read_not_a_scheme_mismatch() {
    let mut fw = MockFirmware::new();
    fw.add_disk("disk", vec![0u8; 100]);
    assert_eq!(resolve(&mut fw, 1), Err(Error::ShortRead));
}

#[test]
fn resolving_twice_returns_identical_results() {
    let mut fw = MockFirmware::new();
    fw.add_disk("disk", three_mac_entries());

    let first = resolve(&mut fw, 2).unwrap();
    let second = resolve(&mut fw, 2).unwrap();
    assert_eq!(first, second);
}
