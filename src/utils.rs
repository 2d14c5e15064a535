pub fn align_up(size: usize, align: usize) -> usize {
    assert!(align > 0);
    if size % align == 0 {
        return size;
    }

    let result = ((size / align) + 1) * align;

    assert!(result >= size);
    assert!(result % align == 0);

    result
}

pub fn align_up_u64(size: u64, align: u64) -> u64 {
    assert!(align > 0);
    (size + align - 1) / align * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up_u64(0x1001, 0x1000), 0x2000);
        assert_eq!(align_up_u64(0x1000, 0x1000), 0x1000);
    }
}
