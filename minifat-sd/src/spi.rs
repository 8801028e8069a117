/// Byte-level access to the SPI bus the card is wired to.
pub trait SpiBus {
    /// Clocks `byte` out and returns the byte clocked in at the same time.
    fn transfer(&mut self, byte: u8) -> u8;

    /// Drives the chip select line of the card, `true` meaning selected.
    fn select(&mut self, selected: bool);
}

impl<S: SpiBus + ?Sized> SpiBus for &mut S {
    #[inline]
    fn transfer(&mut self, byte: u8) -> u8 {
        (**self).transfer(byte)
    }

    #[inline]
    fn select(&mut self, selected: bool) {
        (**self).select(selected);
    }
}
