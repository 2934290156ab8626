pub(crate) mod mem;
