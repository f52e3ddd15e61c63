pub mod cha;
