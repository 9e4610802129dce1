/// Row access to a single-channel image; rows may be padded in storage but
/// `row(y)` always yields exactly `width()` pixels.
pub trait ImageView {
    type Pixel: Copy;

    fn width(&self) -> usize;
    fn height(&self) -> usize;
    fn row(&self, y: usize) -> &[Self::Pixel];

    fn rows(&self) -> Rows<'_, Self>
    where
        Self: Sized,
    {
        Rows { image: self, y: 0 }
    }

    fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

pub trait ImageViewMut: ImageView {
    fn row_mut(&mut self, y: usize) -> &mut [Self::Pixel];
}

/// Top-to-bottom row iterator returned by [`ImageView::rows`].
pub struct Rows<'a, I: ImageView> {
    image: &'a I,
    y: usize,
}

impl<'a, I: ImageView> Iterator for Rows<'a, I> {
    type Item = &'a [I::Pixel];

    fn next(&mut self) -> Option<Self::Item> {
        let image = self.image;
        if self.y >= image.height() {
            return None;
        }
        self.y += 1;
        Some(image.row(self.y - 1))
    }
}
