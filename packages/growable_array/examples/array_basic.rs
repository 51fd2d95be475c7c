//! Basic usage example for `GrowableArray` and `PodArray`.
//!
//! This example shows how the arrays grow, how values are accessed and how errors are returned
//! instead of aborting when memory cannot be obtained.

use growable_array::{GrowableArray, PodArray};
use raw_memory::Error;

fn main() -> Result<(), Error> {
    let mut words = GrowableArray::new();
    println!("Created GrowableArray with capacity: {}", words.capacity());

    for word in ["alpha", "beta", "gamma", "delta", "epsilon"] {
        words.push_back(word.to_string())?;
        println!("Pushed {word:?}, len {} capacity {}", words.len(), words.capacity());
    }

    // The capacity grew 4 -> 6 when the fifth value arrived.
    assert_eq!(words.capacity(), 6);

    // Out of range access is not an error, just nothing.
    println!("Value at 1: {:?}", words.at(1));
    println!("Value at 10: {:?}", words.at(10));
    assert!(words.at(10).is_none());

    // Modify in place through the slice view.
    for word in words.iter_mut() {
        word.make_ascii_uppercase();
    }

    println!("Uppercased: {words:?}");

    // Append default values and clones of a template.
    let mut counts = GrowableArray::<u32>::new();
    counts.grow(3)?;
    counts.grow_filled(2, &7)?;
    assert_eq!(counts.as_slice(), &[0, 0, 0, 7, 7]);

    // An element count whose byte size overflows is reported, the array stays as it was.
    let error = counts.grow(usize::MAX).unwrap_err();
    println!("Growing by usize::MAX failed: {error}");
    assert_eq!(counts.len(), 5);

    let copy = words.try_clone()?;
    words.reset();
    println!(
        "After reset: len {} capacity {}, the copy still holds {:?}",
        words.len(),
        words.capacity(),
        copy.as_slice()
    );

    // Plain Copy values go into the POD array, which starts at 16 and doubles.
    let mut samples = PodArray::new();
    for sample in (0..60_u16).step_by(3) {
        samples.push_back(sample)?;
    }

    println!(
        "PodArray holds {} samples with capacity {}",
        samples.len(),
        samples.capacity()
    );
    assert_eq!(samples.capacity(), 32);

    // find() returns len() when nothing matches.
    assert_eq!(samples.find(&27), 9);
    assert_eq!(samples.find(&1), samples.len());

    println!("Array example completed successfully!");

    Ok(())
}
