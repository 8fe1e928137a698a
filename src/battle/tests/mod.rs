#[cfg(test)]
pub mod common;






#[cfg(test)]
mod test_talents;

#[cfg(test)]
mod test_session;
