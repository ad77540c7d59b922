/*!
 * Verified publisher extractor
 *
 * Responsibility:
 * - Hand the identity verified by the publish gate middleware to handlers
 * - Handlers take `Publisher`, never a raw header or claim
 */

mod core;

pub use self::core::Publisher;
