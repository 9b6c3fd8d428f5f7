use brkalloc::{Heap, Kernel, MMAP_THRESHOLD};

fn main() {
    let mut heap: Heap = Heap::new(Kernel::new());

    unsafe {
        // Big enough to skip the arena and get its own mapping.
        let block1 = heap.allocate(MMAP_THRESHOLD);
        println!("{block1:?}");
        let block2 = heap.allocate(4 * MMAP_THRESHOLD);
        println!("{block2:?}");

        println!("Deallocating block1");
        heap.release(block1);

        // A page worth of zeroed memory is mapped too.
        let block3 = heap.zero_allocate(512, 8);
        println!("Zeroed mapping at {block3:?}");

        heap.release(block2);
        heap.release(block3);
    }
}
