//! Installs brkalloc as the global allocator and exercises the standard
//! collections on top of it.

use std::collections::HashMap;

use brkalloc::BrkAlloc;

#[global_allocator]
static GLOBAL: BrkAlloc = BrkAlloc::new();

#[test]
fn test_box() {
    let b = Box::new(42u64);
    assert_eq!(*b, 42);
    drop(b);
}

#[test]
fn test_vec_growth() {
    let mut v = Vec::new();
    for i in 0..10_000u32 {
        v.push(i);
    }
    assert_eq!(v.len(), 10_000);
    assert_eq!(v[5_000], 5_000);
    assert!(v.iter().enumerate().all(|(i, &x)| i as u32 == x));
}

#[test]
fn test_string() {
    let mut s = String::new();
    for _ in 0..100 {
        s.push_str("hello world ");
    }
    assert_eq!(s.len(), 1200);
    assert!(s.starts_with("hello world hello"));
}

#[test]
fn test_hashmap() {
    // hashbrown asks for 16 byte aligned tables.
    let mut map = HashMap::new();
    for i in 0..500 {
        map.insert(i, format!("value_{i}"));
    }
    assert_eq!(map.len(), 500);
    assert_eq!(map[&42], "value_42");
}

#[test]
fn test_overaligned() {
    #[repr(align(256))]
    struct Page([u8; 256]);

    let pages: Vec<Box<Page>> = (0..8).map(|i| Box::new(Page([i as u8; 256]))).collect();
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(&**page as *const Page as usize % 256, 0);
        assert!(page.0.iter().all(|&b| b == i as u8));
    }
}

#[test]
fn test_large_allocation() {
    // Goes through the mapped path.
    let v: Vec<u8> = vec![0xAB; 512 * 1024];
    assert_eq!(v.len(), 512 * 1024);
    assert!(v.iter().all(|&b| b == 0xAB));
}

#[test]
fn test_zeroed_allocation() {
    let v: Vec<u64> = vec![0; 100_000];
    assert!(v.iter().all(|&x| x == 0));
}

#[test]
fn test_alloc_free_cycle() {
    for round in 0..100u64 {
        let v: Vec<u64> = (0..100).map(|x| x * round).collect();
        assert_eq!(v[99], 99 * round);
        drop(v);
    }
}

#[test]
fn test_threads_share_the_heap() {
    let handles: Vec<_> = (0..4)
        .map(|t| {
            std::thread::spawn(move || {
                let mut v: Vec<Vec<u32>> = Vec::new();
                for i in 0..200 {
                    v.push(vec![t; i]);
                }
                v.iter().all(|inner| inner.iter().all(|&x| x == t))
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
}

#[test]
fn test_direct_operations() {
    // Same heap as the collections above: a second one would race them on
    // the program break.
    unsafe {
        let p = GLOBAL.allocate(100);
        assert_eq!(p as usize % 8, 0);
        p.write_bytes(0x7F, 100);

        let q = GLOBAL.resize(p, 300);
        assert!(std::slice::from_raw_parts(q, 100).iter().all(|&b| b == 0x7F));

        let z = GLOBAL.zero_allocate(16, 16);
        assert!(std::slice::from_raw_parts(z, 256).iter().all(|&b| b == 0));

        GLOBAL.release(q);
        GLOBAL.release(z);
        assert!(GLOBAL.allocate(0).is_null());
        assert!(GLOBAL.zero_allocate(0, 4).is_null());
    }
}
