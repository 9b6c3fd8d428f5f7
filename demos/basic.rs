use brkalloc::Heap;

fn log_alloc(addr: *mut u8, size: usize) {
    println!("Requested {size} bytes of memory");
    println!("Received this address: {addr:?}");
}

fn main() {
    let mut heap: Heap = Heap::new(brkalloc::Kernel::new());

    unsafe {
        let addr1 = heap.allocate(8);
        log_alloc(addr1, 8);

        let addr2 = heap.allocate(100);
        log_alloc(addr2, 100);

        let addr3 = heap.zero_allocate(4, 16);
        log_alloc(addr3, 64);

        heap.release(addr1);

        // Best fit puts this right back where addr1 was.
        let addr4 = heap.allocate(8);
        println!("Reused the released block: {}", addr4 == addr1);

        let addr5 = heap.resize(addr2, 400);
        println!("Resized {addr2:?} -> {addr5:?}");

        heap.release(addr3);
        heap.release(addr4);
        heap.release(addr5);
    }
}
