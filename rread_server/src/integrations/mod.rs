pub mod email;
pub mod mercadopago;
