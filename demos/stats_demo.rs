use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use clap::Parser;
use radix_page_hash::AddOutcome;
use radix_page_hash::Index;
use radix_page_hash::MAX_SHIFT;
use radix_page_hash::Page;
use radix_page_hash::RADIX_BITS;
use radix_page_hash::Route;
use radix_page_hash::digit;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'n', long = "num_values", default_value_t = 100_000)]
    num_values: u64,

    /// Chain length that triggers a split.
    #[arg(short = 'l', long = "chain_limit", default_value_t = 8)]
    chain_limit: usize,
}

fn hash_u64(value: u64) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

struct Bucket {
    page: Page<u64, u64>,
    home_shift: u32,
}

fn main() {
    let args = Args::parse();

    println!(
        "Filling index with {} u64 values (chain limit {})...",
        args.num_values, args.chain_limit
    );

    let mut index = Index::new();
    let mut buckets: Vec<Bucket> = Vec::new();
    let mut num_appended = 0u64;
    let mut num_splits = 0u64;

    for value in 0..args.num_values {
        let h = hash_u64(value);
        let (page_id, level) = match index.lookup_pagepos_for_hashkey(h) {
            Ok((at, level)) => {
                let Route::Page(page_id) = index.internal_get(at) else {
                    panic!("descent for {h:#018X} stopped on a link");
                };
                (page_id, level)
            }
            Err(_) => {
                let page_id = buckets.len() as u64;
                index.insert_route(h, page_id).unwrap();
                let (_, level) = index.lookup_pagepos_for_hashkey(h).unwrap();
                buckets.push(Bucket {
                    page: Page::new(),
                    home_shift: level,
                });
                (page_id, level)
            }
        };

        let bucket = &mut buckets[page_id as usize];
        let home = u64::from(digit(h, bucket.home_shift));
        if bucket.page.add(home, value, value, h).unwrap() == AddOutcome::AppendedOk {
            num_appended += 1;
        }

        if bucket.page.chain_len(home) > args.chain_limit && level < MAX_SHIFT {
            let shift = level + RADIX_BITS;
            let new_page_id = buckets.len() as u64;
            let mut sibling = Page::new();
            let mut positions = BTreeMap::new();
            buckets[page_id as usize]
                .page
                .split(home, shift, &mut sibling, new_page_id, &mut positions)
                .unwrap();
            positions.insert(0, page_id);
            index.split(h, level, &positions).unwrap();
            buckets.push(Bucket {
                page: sibling,
                home_shift: shift,
            });
            num_splits += 1;
        }
    }

    let stored: u64 = buckets.iter().map(|b| b.page.n_items()).sum();
    println!("Stored {} values in {} pages", stored, buckets.len());
    println!(
        "Chained appends: {} ({:.02}%), splits: {}",
        num_appended,
        num_appended as f64 / args.num_values as f64 * 100.0,
        num_splits
    );

    index.debug_stats().print();

    if let Some(busiest) = buckets.iter().max_by_key(|b| b.page.n_items()) {
        busiest.page.debug_stats().print();
    }
}
