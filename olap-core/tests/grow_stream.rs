use olap_core::index::INDEX_FILE_NAME;
use olap_core::io::{DumpReader, OvlReader};
use olap_core::record::SHORT_RECORD_SIZE;
use olap_core::shard::shard_file_name;
use olap_core::{
    GrowConfig, GrowMode, Grower, Orientation, OverlapRecord, PhysicalOverlap, Store, StoreResult,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SCENARIO_OVL: &str = "\
{OVL
afr:1
bfr:2
ori:N
olt:D
ahg:-10
bhg:-5
qua:0.020000
mno:0
mxo:0
pct:0
del:
.
}
{OVL
afr:3
bfr:4
ori:I
olt:C
ahg:3
bhg:-2
qua:0.050000
mno:0
mxo:0
pct:0
del:
.
}
";

fn create_mode(output: &Path, records_per_shard: u32) -> GrowMode {
    GrowMode::Create {
        output: output.to_path_buf(),
        records_per_shard,
        force: false,
    }
}

fn random_overlaps(seed: u64, count: usize, max_id: u32) -> Vec<PhysicalOverlap> {
    let mut rng = StdRng::seed_from_u64(seed);
    let orientations = [
        Orientation::Normal,
        Orientation::Anti,
        Orientation::Innie,
        Orientation::Outtie,
    ];
    (0..count)
        .map(|_| {
            let a_id = rng.gen_range(1..=max_id);
            let mut b_id = rng.gen_range(1..=max_id);
            if b_id == a_id {
                b_id = a_id % max_id + 1;
            }
            PhysicalOverlap {
                a_id,
                b_id,
                orientation: orientations[rng.gen_range(0..orientations.len())],
                a_hang: rng.gen_range(-500..=500),
                b_hang: rng.gen_range(-500..=500),
                quality: rng.gen_range(0.0..0.08),
            }
        })
        .collect()
}

fn grow_from(mode: GrowMode, config: GrowConfig, overlaps: &[PhysicalOverlap]) -> PathBuf {
    let mut grower = Grower::new(mode, config).expect("start grower");
    let output = grower.output().to_path_buf();
    for ovl in overlaps {
        grower.add_overlap(ovl).expect("add overlap");
    }
    grower.finish().expect("finish grow");
    output
}

fn all_records(store: &Store) -> Vec<OverlapRecord> {
    store
        .stream_all()
        .expect("open stream")
        .collect::<StoreResult<Vec<_>>>()
        .expect("stream records")
}

fn store_bytes(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "olap"))
        .map(|p| (p.file_name().unwrap().to_string_lossy().into_owned(), fs::read(&p).unwrap()))
        .collect();
    files.sort();
    files
}

#[test]
fn scenario_two_overlaps_two_shards() {
    let tmp = TempDir::new().unwrap();
    let ovl_path = tmp.path().join("batch.ovl");
    fs::write(&ovl_path, SCENARIO_OVL).unwrap();
    let out = tmp.path().join("test.ovlStore");

    let mut grower = Grower::new(create_mode(&out, 2), GrowConfig::default()).expect("create");
    for ovl in OvlReader::open(&ovl_path).expect("open ovl") {
        grower.add_overlap(&ovl.expect("parse ovl")).expect("add overlap");
    }
    let summary = grower.finish().expect("finish");
    assert_eq!(summary.overlaps_read, 2);
    assert_eq!(summary.total_records, 4);
    assert_eq!(summary.max_id, 4);
    assert_eq!(summary.shards, 2);
    assert!(out.join("data01.olap").is_file());
    assert!(out.join("data02.olap").is_file());
    assert!(!out.join("data03.olap").exists());

    let store = Store::open(&out).expect("open store");
    assert_eq!(store.last_id(), 4);

    let records = all_records(&store);
    let ids: Vec<_> = records.iter().map(|r| (r.a_id, r.b_id)).collect();
    assert_eq!(ids, vec![(1, 2), (2, 1), (3, 4), (4, 3)]);

    assert_eq!((records[0].a_hang, records[0].b_hang, records[0].flipped), (-10, -5, false));
    assert_eq!((records[1].a_hang, records[1].b_hang), (10, 5));
    assert_eq!((records[2].a_hang, records[2].b_hang, records[2].flipped), (3, -2, true));
    assert_eq!((records[3].a_hang, records[3].b_hang, records[3].flipped), (-2, 3, true));
    assert_eq!(records[0].orig_erate, 20);
    assert_eq!(records[2].corr_erate, 50);

    let only_two: Vec<_> = store
        .stream(2, 2)
        .expect("stream id 2")
        .collect::<StoreResult<Vec<_>>>()
        .expect("read id 2");
    assert_eq!(only_two.len(), 1);
    assert_eq!((only_two[0].a_id, only_two[0].b_id), (2, 1));
}

#[test]
fn reciprocity_and_completeness_hold_for_random_overlaps() {
    let tmp = TempDir::new().unwrap();
    let overlaps = random_overlaps(7, 600, 97);
    let out = grow_from(create_mode(&tmp.path().join("s"), 10), GrowConfig::default(), &overlaps);

    let store = Store::open(&out).expect("open store");
    store.verify_shard_sizes().expect("shard sizes");
    let index = store.index().clone();
    let records = all_records(&store);
    assert_eq!(records.len() as u64, index.total_records());
    assert_eq!(records.len(), 2 * overlaps.len());

    // ascending a_id, with per-id counts matching the index
    assert!(records.windows(2).all(|w| w[0].a_id <= w[1].a_id));
    let mut per_id: HashMap<u32, u32> = HashMap::new();
    for rec in &records {
        *per_id.entry(rec.a_id).or_default() += 1;
    }
    for id in 1..=store.last_id() {
        assert_eq!(per_id.get(&id).copied().unwrap_or(0), index.count(id), "id {id}");
    }

    let mut multiset: HashMap<OverlapRecord, usize> = HashMap::new();
    for rec in &records {
        *multiset.entry(*rec).or_default() += 1;
    }
    for (rec, n) in &multiset {
        assert_eq!(multiset.get(&rec.reciprocal()), Some(n), "no reciprocal for {rec}");
    }
}

#[test]
fn many_small_batches_match_one_large_batch() {
    let tmp = TempDir::new().unwrap();
    let overlaps = random_overlaps(11, 400, 60);

    let single = grow_from(create_mode(&tmp.path().join("single"), 8), GrowConfig::default(), &overlaps);
    let small = GrowConfig {
        max_batch: 5,
        ..GrowConfig::default()
    };
    let batched = grow_from(create_mode(&tmp.path().join("batched"), 8), small.clone(), &overlaps);
    let thrifty = GrowConfig {
        save_space: true,
        ..small
    };
    let saved = grow_from(create_mode(&tmp.path().join("saved"), 8), thrifty, &overlaps);

    let expected = all_records(&Store::open(&single).unwrap());
    assert_eq!(all_records(&Store::open(&batched).unwrap()), expected);
    assert_eq!(all_records(&Store::open(&saved).unwrap()), expected);
    assert_eq!(store_bytes(&batched), store_bytes(&single));
    assert_eq!(store_bytes(&saved), store_bytes(&single));
}

#[test]
fn appending_keeps_old_records_first() {
    let tmp = TempDir::new().unwrap();
    let first = random_overlaps(3, 150, 40);
    let second = random_overlaps(4, 150, 55);
    let out = grow_from(create_mode(&tmp.path().join("s"), 16), GrowConfig::default(), &first);

    let append = GrowMode::Append {
        store: out.clone(),
        backup: false,
    };
    grow_from(append, GrowConfig::default(), &second);

    let mut both = first.clone();
    both.extend(second);
    let reference = grow_from(create_mode(&tmp.path().join("ref"), 16), GrowConfig::default(), &both);

    let store = Store::open(&out).unwrap();
    let max_id = both.iter().map(|o| o.a_id.max(o.b_id)).max().unwrap();
    assert_eq!(store.last_id(), max_id);
    assert_eq!(all_records(&store), all_records(&Store::open(&reference).unwrap()));
}

#[test]
fn empty_grow_with_save_space_is_byte_identical() {
    let tmp = TempDir::new().unwrap();
    let overlaps = random_overlaps(5, 200, 50);
    let input = grow_from(create_mode(&tmp.path().join("in"), 7), GrowConfig::default(), &overlaps);
    let before = store_bytes(&input);

    let save_space = GrowConfig {
        save_space: true,
        ..GrowConfig::default()
    };
    let copy = GrowMode::Copy {
        input: input.clone(),
        output: tmp.path().join("out"),
        force: false,
    };
    let output = grow_from(copy, save_space.clone(), &[]);
    assert_eq!(store_bytes(&output), before);
    assert_eq!(store_bytes(&input), before);

    let append = GrowMode::Append {
        store: input.clone(),
        backup: false,
    };
    grow_from(append, save_space, &[]);
    assert_eq!(store_bytes(&input), before);
}

#[test]
fn copy_mode_leaves_input_untouched() {
    let tmp = TempDir::new().unwrap();
    let input = grow_from(
        create_mode(&tmp.path().join("in"), 4),
        GrowConfig::default(),
        &random_overlaps(1, 50, 20),
    );
    let before = store_bytes(&input);

    let copy = GrowMode::Copy {
        input: input.clone(),
        output: tmp.path().join("out"),
        force: false,
    };
    let config = GrowConfig {
        max_batch: 3,
        save_space: true,
        ..GrowConfig::default()
    };
    let added = random_overlaps(2, 30, 30);
    let output = grow_from(copy, config, &added);

    assert_eq!(store_bytes(&input), before);
    let grown = Store::open(&output).unwrap();
    assert_eq!(grown.total_records(), 2 * (50 + 30));
    let max_added = added.iter().map(|o| o.a_id.max(o.b_id)).max().unwrap();
    assert_eq!(grown.last_id(), max_added.max(Store::open(&input).unwrap().last_id()));
    grown.verify_shard_sizes().unwrap();
}

#[test]
fn dump_format_input_round_trips_through_store() {
    let tmp = TempDir::new().unwrap();
    let source = grow_from(
        create_mode(&tmp.path().join("src"), 5),
        GrowConfig::default(),
        &random_overlaps(9, 80, 30),
    );
    let source_store = Store::open(&source).unwrap();

    // one line per physical overlap: keep only records filed under the smaller id
    let mut dump = String::new();
    for rec in all_records(&source_store) {
        if rec.a_id < rec.b_id {
            dump.push_str(&format!("{rec}\n"));
        }
    }
    let dump_path = tmp.path().join("olaps.dump");
    fs::write(&dump_path, dump).unwrap();

    let out = tmp.path().join("from_dump");
    let mut grower = Grower::new(create_mode(&out, 5), GrowConfig::default()).unwrap();
    for pair in DumpReader::open(&dump_path).unwrap() {
        let (fwd, rev) = pair.expect("parse dump line");
        grower.add_pair(fwd, rev).unwrap();
    }
    grower.finish().unwrap();

    let mut expected = all_records(&source_store);
    let mut actual = all_records(&Store::open(&out).unwrap());
    let key = |r: &OverlapRecord| {
        (r.a_id, r.b_id, r.a_hang, r.b_hang, r.flipped, r.orig_erate, r.corr_erate)
    };
    expected.sort_by_key(key);
    actual.sort_by_key(key);
    assert_eq!(actual, expected);
}

#[test]
fn corrupt_stores_are_reported() {
    let tmp = TempDir::new().unwrap();
    let out = grow_from(
        create_mode(&tmp.path().join("s"), 4),
        GrowConfig::default(),
        &random_overlaps(6, 40, 12),
    );

    // truncated shard: streaming fails with CorruptStore
    let shard = out.join(shard_file_name(2));
    let bytes = fs::read(&shard).unwrap();
    fs::write(&shard, &bytes[..bytes.len() - SHORT_RECORD_SIZE]).unwrap();
    let store = Store::open(&out).unwrap();
    let err = store
        .stream_all()
        .unwrap()
        .find_map(Result::err)
        .expect("stream error");
    assert!(matches!(err, olap_core::StoreError::CorruptStore { shard: 2, .. }));

    // truncated index: open fails with Format
    let index_path = out.join(INDEX_FILE_NAME);
    let bytes = fs::read(&index_path).unwrap();
    fs::write(&index_path, &bytes[..bytes.len() - 2]).unwrap();
    assert!(matches!(
        Store::open(&out),
        Err(olap_core::StoreError::Format { .. })
    ));
}
