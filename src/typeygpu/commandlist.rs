#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ECommandListType {
    Direct,
    Bundle,
    Compute,
    Copy,
}

impl Default for ECommandListType {
    fn default() -> Self {
        ECommandListType::Direct
    }
}
